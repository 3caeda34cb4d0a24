//! Typed frame coercion.
//!
//! Enforces a declared `column -> type` mapping on a [`DataFrame`]. Values
//! that cannot be represented in the declared type become null; coercion
//! never fails because of cell contents. Columns named in the mapping but
//! absent from the frame are skipped.

use crate::error::{DataError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Declared column type → the mapping consumed by [`coerce`].
pub type TypeMap = BTreeMap<String, ColumnType>;

/// Date-time layouts accepted for textual timestamps, tried in order.
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts accepted for textual dates.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Logical type a column can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// Timestamp, stored as millisecond `Datetime`
    Datetime,
    /// 64-bit float
    Float,
    /// 64-bit signed integer
    Integer,
    /// UTF-8 string
    String,
}

impl ColumnType {
    /// Canonical lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Datetime => "datetime",
            Self::Float => "float",
            Self::Integer => "integer",
            Self::String => "string",
        }
    }

    /// Physical polars dtype a coerced column ends up with.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Datetime => DataType::Datetime(TimeUnit::Milliseconds, None),
            Self::Float => DataType::Float64,
            Self::Integer => DataType::Int64,
            Self::String => DataType::String,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = DataError;

    /// Accepts the canonical names as well as dtype spellings such as
    /// `float64`, `int64`, `datetime64[ns]` or `str` (matched by prefix).
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        if lowered.starts_with("date") {
            Ok(Self::Datetime)
        } else if lowered.starts_with("float") {
            Ok(Self::Float)
        } else if lowered.starts_with("int") {
            Ok(Self::Integer)
        } else if lowered.starts_with("str") {
            Ok(Self::String)
        } else {
            Err(DataError::Parse(format!("Unknown column type: {}", s)))
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.name().to_string()
    }
}

/// Coerce every declared column present in `df` to its declared type.
///
/// Applying the same mapping twice yields the same frame as applying it once.
pub fn coerce(mut df: DataFrame, types: &TypeMap) -> Result<DataFrame> {
    for (name, ty) in types {
        let Some(idx) = df.get_column_index(name) else {
            continue;
        };
        let coerced = coerce_series(df.get_columns()[idx].as_materialized_series(), *ty);
        df.with_column(coerced)?;
    }
    Ok(df)
}

/// Coerce a single series; unrepresentable values become null.
pub fn coerce_series(series: &Series, ty: ColumnType) -> Series {
    let coerced = match ty {
        ColumnType::Datetime => to_datetime(series),
        ColumnType::Float => to_float(series),
        ColumnType::Integer => to_integer(series),
        ColumnType::String => series.cast(&DataType::String),
    };
    coerced.unwrap_or_else(|_| Series::full_null(series.name().clone(), series.len(), &ty.dtype()))
}

/// Truncate `column` of `df` to calendar-day granularity (`Date` dtype).
///
/// Strings are parsed first; values that do not parse become null. Running
/// this on an already truncated column is a no-op.
pub fn to_calendar_day(mut df: DataFrame, table: &str, column: &str) -> Result<DataFrame> {
    let Some(idx) = df.get_column_index(column) else {
        return Err(DataError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        });
    };

    let series = df.get_columns()[idx].as_materialized_series();
    if series.dtype() == &DataType::Date {
        return Ok(df);
    }

    let day = to_datetime(series)
        .and_then(|s| s.cast(&DataType::Date))
        .unwrap_or_else(|_| Series::full_null(series.name().clone(), series.len(), &DataType::Date));
    df.with_column(day)?;
    Ok(df)
}

/// Parse a textual timestamp.
///
/// Offsets in RFC 3339 strings are dropped after conversion to local wall-clock
/// time, so `2024-03-01T23:30:00+01:00` stays on March 1st.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn to_datetime(series: &Series) -> PolarsResult<Series> {
    let target = ColumnType::Datetime.dtype();
    match series.dtype() {
        DataType::String => {
            let parsed: Vec<Option<NaiveDateTime>> = series
                .str()?
                .into_iter()
                .map(|v| v.and_then(parse_datetime))
                .collect();
            Series::new(series.name().clone(), parsed).cast(&target)
        }
        DataType::Date | DataType::Datetime(_, _) => series.cast(&target),
        _ => Ok(Series::full_null(
            series.name().clone(),
            series.len(),
            &target,
        )),
    }
}

fn to_float(series: &Series) -> PolarsResult<Series> {
    match series.dtype() {
        DataType::String => {
            let parsed: Float64Chunked = series
                .str()?
                .into_iter()
                .map(|v| v.and_then(|v| v.trim().parse::<f64>().ok()))
                .collect();
            Ok(parsed.with_name(series.name().clone()).into_series())
        }
        _ => series.cast(&DataType::Float64),
    }
}

/// Integers only accept integral values; `12.5` becomes null rather than `12`.
fn to_integer(series: &Series) -> PolarsResult<Series> {
    if series.dtype().is_integer() {
        return series.cast(&DataType::Int64);
    }

    let floats = to_float(series)?;
    let parsed: Int64Chunked = floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|v| v.is_finite() && v.fract() == 0.0).map(|v| v as i64))
        .collect();
    Ok(parsed.with_name(series.name().clone()).into_series())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn types(pairs: &[(&str, ColumnType)]) -> TypeMap {
        pairs
            .iter()
            .map(|(name, ty)| (name.to_string(), *ty))
            .collect()
    }

    fn as_day_strings(df: &DataFrame, column: &str) -> Vec<Option<String>> {
        let days = df
            .column(column)
            .unwrap()
            .as_materialized_series()
            .cast(&DataType::Date)
            .unwrap()
            .cast(&DataType::String)
            .unwrap();
        days.str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[rstest]
    #[case("datetime", ColumnType::Datetime)]
    #[case("datetime64[ns]", ColumnType::Datetime)]
    #[case("float64", ColumnType::Float)]
    #[case("Int64", ColumnType::Integer)]
    #[case("integer", ColumnType::Integer)]
    #[case("str", ColumnType::String)]
    #[case(" string ", ColumnType::String)]
    fn test_column_type_parsing(#[case] raw: &str, #[case] expected: ColumnType) {
        assert_eq!(raw.parse::<ColumnType>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_column_type_rejected() {
        assert!("decimal".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_float_coercion_nulls_bad_values() {
        let df = df!("Adj Close" => &["101.5", "oops", " 99 "]).unwrap();
        let out = coerce(df, &types(&[("Adj Close", ColumnType::Float)])).unwrap();

        let values: Vec<Option<f64>> = out
            .column("Adj Close")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(101.5), None, Some(99.0)]);
    }

    #[test]
    fn test_integer_coercion_rejects_fractions() {
        let df = df!("Volume" => &["1200", "12.5", "abc", "300.0"]).unwrap();
        let out = coerce(df, &types(&[("Volume", ColumnType::Integer)])).unwrap();

        let series = out.column("Volume").unwrap().as_materialized_series();
        assert_eq!(series.dtype(), &DataType::Int64);
        let values: Vec<Option<i64>> = series.i64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(1200), None, None, Some(300)]);
    }

    #[test]
    fn test_datetime_coercion_parses_and_nulls() {
        let df = df!("Date" => &["2024-01-02", "2024-01-03 17:45:00", "not a date"]).unwrap();
        let out = coerce(df, &types(&[("Date", ColumnType::Datetime)])).unwrap();

        assert_eq!(
            out.column("Date").unwrap().dtype(),
            &ColumnType::Datetime.dtype()
        );
        assert_eq!(
            as_day_strings(&out, "Date"),
            vec![
                Some("2024-01-02".to_string()),
                Some("2024-01-03".to_string()),
                None
            ]
        );
    }

    #[test]
    fn test_absent_columns_are_skipped() {
        let df = df!("Ticker" => &["MC.PA"]).unwrap();
        let out = coerce(
            df.clone(),
            &types(&[("Sector", ColumnType::String), ("Ticker", ColumnType::String)]),
        )
        .unwrap();
        assert!(out.equals_missing(&df));
    }

    #[test]
    fn test_coercion_is_idempotent() {
        let df = df!(
            "Date" => &["2024-01-02", "garbage", "2024-01-04T10:00:00"],
            "Adj Close" => &["1.5", "", "3"],
            "Volume" => &["10", "11", "x"],
            "Ticker" => &["A", "B", "C"]
        )
        .unwrap();
        let map = types(&[
            ("Date", ColumnType::Datetime),
            ("Adj Close", ColumnType::Float),
            ("Volume", ColumnType::Integer),
            ("Ticker", ColumnType::String),
        ]);

        let once = coerce(df, &map).unwrap();
        let twice = coerce(once.clone(), &map).unwrap();
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_calendar_day_truncation_is_idempotent() {
        let df = df!("Date" => &["2024-03-01T23:30:00+01:00", "2024-03-02 08:00:00", "?"]).unwrap();
        let once = to_calendar_day(df, "macro", "Date").unwrap();
        assert_eq!(once.column("Date").unwrap().dtype(), &DataType::Date);

        let twice = to_calendar_day(once.clone(), "macro", "Date").unwrap();
        assert!(once.equals_missing(&twice));
        assert_eq!(
            as_day_strings(&twice, "Date"),
            vec![
                Some("2024-03-01".to_string()),
                Some("2024-03-02".to_string()),
                None
            ]
        );
    }

    #[test]
    fn test_calendar_day_missing_column() {
        let df = df!("Ticker" => &["A"]).unwrap();
        let err = to_calendar_day(df, "prices", "Date").unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { .. }));
    }

    #[test]
    fn test_parse_datetime_variants() {
        assert!(parse_datetime("2024-01-02").is_some());
        assert!(parse_datetime("2024/01/02").is_some());
        assert!(parse_datetime("2024-01-02 10:11:12.500").is_some());
        assert!(parse_datetime("").is_none());
        assert!(parse_datetime("02-01-2024x").is_none());
    }
}
