//! Normalisation of the raw tables and the post-transform sanity check.

use crate::error::{DataError, Result};
use crate::frame::{ColumnType, coerce_series, to_calendar_day};
use crate::ingest::RawTables;
use crate::schema::{DATE, INDICATOR, MACRO_COLUMNS, VALUE};
use polars::prelude::*;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// How the raw macro series is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroLayout {
    /// Provider column holding the observation period
    pub date_column: String,
    /// Provider column holding the observation value
    pub value_column: String,
    /// Tag written to the `Indicator` column
    pub indicator: String,
}

impl Default for MacroLayout {
    fn default() -> Self {
        Self {
            date_column: "TIME_PERIOD".to_string(),
            value_column: "OBS_VALUE".to_string(),
            indicator: "estr".to_string(),
        }
    }
}

/// Tables after transformation, ready for staging.
#[derive(Debug, Clone)]
pub struct Tables {
    /// Price series
    pub prices: DataFrame,
    /// Macro series projected to `Date, Indicator, Value`
    pub macro_rates: DataFrame,
    /// Sector table
    pub sectors: DataFrame,
}

impl Tables {
    /// Tables paired with their logical names, in staging order.
    pub fn named<'a>(&'a self, names: &'a TableNames) -> [(&'a str, &'a DataFrame); 3] {
        [
            (names.prices.as_str(), &self.prices),
            (names.macro_rates.as_str(), &self.macro_rates),
            (names.sectors.as_str(), &self.sectors),
        ]
    }
}

/// Names under which the three tables are staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    /// Price table name
    pub prices: String,
    /// Macro table name
    pub macro_rates: String,
    /// Sector table name
    pub sectors: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            prices: "stock".to_string(),
            macro_rates: "macro".to_string(),
            sectors: "companies".to_string(),
        }
    }
}

/// Transform raw tables.
///
/// Prices and sectors pass through untouched. The macro series is renamed to
/// `Date`/`Value`, truncated to calendar days, tagged with the indicator and
/// projected to exactly [`MACRO_COLUMNS`].
pub fn transform(raw: &RawTables, layout: &MacroLayout) -> Result<Tables> {
    let macro_rates = normalize_macro(raw.macro_rates.clone(), layout)?;

    let unparsed = macro_rates.column(DATE)?.null_count();
    if unparsed > 0 {
        warn!(
            rows = unparsed,
            "Macro rows with unparseable dates will not join"
        );
    }

    info!(rows = macro_rates.height(), indicator = %layout.indicator, "Normalised macro series");

    Ok(Tables {
        prices: raw.prices.clone(),
        macro_rates,
        sectors: raw.sectors.clone(),
    })
}

fn normalize_macro(mut df: DataFrame, layout: &MacroLayout) -> Result<DataFrame> {
    for (from, to) in [(&layout.date_column, DATE), (&layout.value_column, VALUE)] {
        if from == to {
            continue;
        }
        if df.get_column_index(from).is_none() {
            return Err(DataError::MissingColumn {
                table: "macro".to_string(),
                column: from.clone(),
            });
        }
        df.rename(from, to.into())?;
    }

    let df = to_calendar_day(df, "macro", DATE)?;
    let height = df.height();

    let mut df = df
        .lazy()
        .with_columns([lit(layout.indicator.as_str()).alias(INDICATOR)])
        .select(MACRO_COLUMNS.map(col))
        .collect()?;
    let value = coerce_series(df.column(VALUE)?.as_materialized_series(), ColumnType::Float);
    df.with_column(value)?;

    debug_assert_eq!(df.height(), height);
    Ok(df)
}

/// Findings of the post-transform check. Never blocks the pipeline.
#[derive(Debug, Clone)]
pub struct SanityReport {
    /// `(table, rows, columns)` for every checked table
    pub shapes: Vec<(String, usize, usize)>,
    /// Mandatory columns absent from each table
    pub missing: BTreeMap<String, Vec<String>>,
    /// `table, column, dtype` rows
    pub dtypes: DataFrame,
}

impl SanityReport {
    /// Whether every mandatory column was found.
    pub fn is_complete(&self) -> bool {
        self.missing.values().all(Vec::is_empty)
    }
}

/// Report shapes and dtypes, and warn about absent mandatory columns.
///
/// `mandatory` maps a table name to the columns it must carry; tables not
/// listed are reported but not checked.
pub fn sanity_check(
    tables: &[(&str, &DataFrame)],
    mandatory: &BTreeMap<String, Vec<String>>,
) -> Result<SanityReport> {
    let mut shapes = Vec::with_capacity(tables.len());
    let mut missing = BTreeMap::new();
    let mut table_col = Vec::new();
    let mut column_col = Vec::new();
    let mut dtype_col = Vec::new();

    for (name, df) in tables {
        info!(table = name, rows = df.height(), columns = df.width(), "Table shape");
        shapes.push((name.to_string(), df.height(), df.width()));

        for column in df.get_columns() {
            table_col.push(name.to_string());
            column_col.push(column.name().to_string());
            dtype_col.push(column.dtype().to_string());
        }

        if let Some(expected) = mandatory.get(*name) {
            let absent: Vec<String> = expected
                .iter()
                .filter(|c| df.get_column_index(c).is_none())
                .cloned()
                .collect();
            if !absent.is_empty() {
                warn!(table = name, missing = ?absent, "Mandatory columns missing");
            }
            missing.insert(name.to_string(), absent);
        }
    }

    let dtypes = DataFrame::new(vec![
        Column::new("table".into(), table_col),
        Column::new("column".into(), column_col),
        Column::new("dtype".into(), dtype_col),
    ])?;

    Ok(SanityReport {
        shapes,
        missing,
        dtypes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn raw() -> RawTables {
        RawTables {
            prices: df!(
                "Date" => &["2024-01-02", "2024-01-03"],
                "Ticker" => &["MC.PA", "MC.PA"],
                "Adj Close" => &[700.0, 707.0],
                "Volume" => &[10i64, 12]
            )
            .unwrap(),
            macro_rates: df!(
                "TIME_PERIOD" => &["2024-01-02 00:00:00", "2024-01-03", "n/a"],
                "OBS_VALUE" => &[3.9, 3.91, 3.92],
                "TITLE" => &["x", "y", "z"]
            )
            .unwrap(),
            sectors: df!("Ticker" => &["MC.PA"], "Sector" => &["Luxury"]).unwrap(),
        }
    }

    #[test]
    fn test_macro_is_projected_and_tagged() {
        let tables = transform(&raw(), &MacroLayout::default()).unwrap();
        let names: Vec<&str> = tables
            .macro_rates
            .get_column_names()
            .iter()
            .map(|c| c.as_str())
            .collect();
        assert_eq!(names, MACRO_COLUMNS.to_vec());
        assert_eq!(tables.macro_rates.column(DATE).unwrap().dtype(), &DataType::Date);

        let indicator = tables
            .macro_rates
            .column(INDICATOR)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .get(0)
            .map(str::to_string);
        assert_eq!(indicator.as_deref(), Some("estr"));
    }

    #[test]
    fn test_textual_macro_values_are_typed() {
        let mut input = raw();
        input.macro_rates = df!(
            "TIME_PERIOD" => &["2024-01-02", "2024-01-03"],
            "OBS_VALUE" => &["3.90", "bad"]
        )
        .unwrap();

        let tables = transform(&input, &MacroLayout::default()).unwrap();
        let values = tables.macro_rates.column(VALUE).unwrap().f64().unwrap();
        assert_relative_eq!(values.get(0).unwrap(), 3.9);
        assert_eq!(values.get(1), None);
    }

    #[test]
    fn test_unparseable_macro_date_becomes_null() {
        let tables = transform(&raw(), &MacroLayout::default()).unwrap();
        assert_eq!(tables.macro_rates.height(), 3);
        assert_eq!(tables.macro_rates.column(DATE).unwrap().null_count(), 1);
    }

    #[test]
    fn test_prices_and_sectors_pass_through() {
        let input = raw();
        let tables = transform(&input, &MacroLayout::default()).unwrap();
        assert!(tables.prices.equals_missing(&input.prices));
        assert!(tables.sectors.equals_missing(&input.sectors));
    }

    #[test]
    fn test_missing_macro_column_is_error() {
        let layout = MacroLayout {
            date_column: "PERIOD".to_string(),
            ..MacroLayout::default()
        };
        let err = transform(&raw(), &layout).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { column, .. } if column == "PERIOD"));
    }

    #[test]
    fn test_sanity_check_reports_missing_columns() {
        let tables = transform(&raw(), &MacroLayout::default()).unwrap();
        let names = TableNames::default();
        let mut mandatory = BTreeMap::new();
        mandatory.insert(
            "stock".to_string(),
            vec!["Date".to_string(), "Ticker".to_string(), "Open".to_string()],
        );
        mandatory.insert(
            "macro".to_string(),
            vec!["Date".to_string(), "Value".to_string()],
        );

        let report = sanity_check(&tables.named(&names), &mandatory).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.missing["stock"], vec!["Open".to_string()]);
        assert!(report.missing["macro"].is_empty());
        assert_eq!(report.shapes.len(), 3);
        // 4 price + 3 macro + 2 sector columns
        assert_eq!(report.dtypes.height(), 9);
    }
}
