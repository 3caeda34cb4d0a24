//! SQLite staging store.
//!
//! Tables are written column by column with SQLite type affinity derived from
//! the frame dtype. Dates and timestamps are stored as ISO text and come back
//! as strings; re-applying the declared [`TypeMap`](crate::frame::TypeMap)
//! after [`TableStore::read_table`] restores the original column types.

use crate::error::{DataError, Result};
use chrono::{DateTime, NaiveDate};
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Days between 0001-01-01 and the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// How an existing table is treated on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Drop and recreate the table
    #[default]
    Replace,
    /// Keep existing rows and add the new ones
    Append,
}

/// SQLite-backed table store.
#[derive(Debug)]
pub struct TableStore {
    conn: Connection,
}

impl TableStore {
    /// Open (or create) a store file, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened table store");
        Ok(Self { conn })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Names of all tables in the store, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Whether a table exists.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Drop every table in the store.
    pub fn drop_all_tables(&self) -> Result<()> {
        let names = self.table_names()?;
        let tx = self.conn.unchecked_transaction()?;
        for name in &names {
            tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;
        }
        tx.commit()?;
        info!(dropped = names.len(), "Dropped all stored tables");
        Ok(())
    }

    /// Write several tables in one transaction.
    pub fn write_tables<'a, I>(&self, tables: I, mode: WriteMode) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a DataFrame)>,
    {
        let tx = self.conn.unchecked_transaction()?;
        for (name, df) in tables {
            write_one(&tx, name, df, mode)?;
            info!(table = name, rows = df.height(), mode = ?mode, "Stored table");
        }
        tx.commit()?;
        Ok(())
    }

    /// Write a single table.
    pub fn write_table(&self, name: &str, df: &DataFrame, mode: WriteMode) -> Result<()> {
        self.write_tables([(name, df)], mode)
    }

    /// Read a table back into a frame, in insertion order.
    ///
    /// A column holding any REAL value becomes `Float64`; otherwise a column
    /// holding INTEGER values becomes `Int64`; everything else is a string.
    pub fn read_table(&self, name: &str) -> Result<DataFrame> {
        if !self.has_table(name)? {
            return Err(DataError::TableNotFound(name.to_string()));
        }

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(name)))?;
        let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut cells: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (idx, column) in cells.iter_mut().enumerate() {
                column.push(Value::from(row.get_ref(idx)?));
            }
        }

        let columns = names
            .iter()
            .zip(cells)
            .map(|(name, values)| column_from_values(name, values))
            .collect::<Vec<_>>();
        let df = DataFrame::new(columns)?;

        debug!(table = name, rows = df.height(), "Read stored table");
        Ok(df)
    }
}

fn write_one(conn: &Connection, name: &str, df: &DataFrame, mode: WriteMode) -> Result<()> {
    let table = quote_ident(name);
    let definitions = df
        .get_columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name()), affinity(c.dtype())))
        .collect::<Vec<_>>()
        .join(", ");

    if mode == WriteMode::Replace {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
    }
    conn.execute(
        &format!("CREATE TABLE IF NOT EXISTS {} ({})", table, definitions),
        [],
    )?;

    if df.width() == 0 {
        return Ok(());
    }

    let names = df
        .get_columns()
        .iter()
        .map(|c| quote_ident(c.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=df.width())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table, names, placeholders
    ))?;

    let columns = df
        .get_columns()
        .iter()
        .map(|c| to_sql(c.as_materialized_series()))
        .collect::<Result<Vec<_>>>()?;

    for row in 0..df.height() {
        stmt.execute(params_from_iter(columns.iter().map(|c| &c[row])))?;
    }
    Ok(())
}

fn affinity(dtype: &DataType) -> &'static str {
    if dtype.is_integer() || matches!(dtype, DataType::Boolean) {
        "INTEGER"
    } else if dtype.is_float() {
        "REAL"
    } else {
        "TEXT"
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Convert a column into SQLite values following its affinity.
fn to_sql(series: &Series) -> Result<Vec<Value>> {
    let values = match series.dtype() {
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |b| Value::Integer(i64::from(b))))
            .collect(),
        DataType::Date => series
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .map(|v| {
                v.and_then(|days| NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE))
                    .map_or(Value::Null, |d| Value::Text(d.format("%Y-%m-%d").to_string()))
            })
            .collect(),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| v.map_or(Value::Null, |v| timestamp_text(v, unit)))
                .collect()
        }
        dtype if dtype.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Integer))
            .collect(),
        dtype if dtype.is_float() => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Real))
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
            .collect(),
    };
    Ok(values)
}

fn timestamp_text(value: i64, unit: TimeUnit) -> Value {
    let dt = match unit {
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(value),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(value),
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
    };
    dt.map_or(Value::Null, |dt| {
        Value::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
    })
}

fn column_from_values(name: &str, values: Vec<Value>) -> Column {
    let has_real = values.iter().any(|v| matches!(v, Value::Real(_)));
    let has_integer = values.iter().any(|v| matches!(v, Value::Integer(_)));

    if has_real {
        let data: Vec<Option<f64>> = values
            .iter()
            .map(|v| match v {
                Value::Real(f) => Some(*f),
                Value::Integer(i) => Some(*i as f64),
                _ => None,
            })
            .collect();
        Column::new(name.into(), data)
    } else if has_integer {
        let data: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        Column::new(name.into(), data)
    } else {
        let data: Vec<Option<String>> = values
            .into_iter()
            .map(|v| match v {
                Value::Text(s) => Some(s),
                Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
                _ => None,
            })
            .collect();
        Column::new(name.into(), data)
    }
}
