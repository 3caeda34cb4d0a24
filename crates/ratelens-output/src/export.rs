//! Workbook export.
//!
//! A workbook is an ordered list of named sheets written to a directory, one
//! file per sheet, plus a `sheets.txt` index giving the sheet order. Rows are
//! written in the order they appear in each frame.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Name of the sheet index file inside a workbook directory.
pub const SHEET_INDEX: &str = "sheets.txt";

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    /// Sheet name cannot be used as a file name.
    #[error("Invalid sheet name: {0:?}")]
    InvalidSheetName(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Comma-separated values format.
    #[default]
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// A named table of a workbook.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    frame: DataFrame,
}

impl Sheet {
    /// Create a sheet, checking that the name is usable as a file stem.
    pub fn new(name: impl Into<String>, frame: DataFrame) -> Result<Self, ExportError> {
        let name = name.into();
        validate_sheet_name(&name)?;
        Ok(Self { name, frame })
    }

    /// Sheet name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sheet contents.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }
}

impl Exporter for Sheet {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        frame_to_string(&self.frame, format)
    }
}

/// Ordered collection of sheets.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// Create an empty workbook.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet; a sheet with the same name is replaced in place.
    pub fn push(&mut self, sheet: Sheet) {
        match self.sheets.iter_mut().find(|s| s.name == sheet.name) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
    }

    /// Add a sheet built from a name and a frame.
    pub fn add(&mut self, name: impl Into<String>, frame: DataFrame) -> Result<(), ExportError> {
        self.push(Sheet::new(name, frame)?);
        Ok(())
    }

    /// Sheets in order.
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Sheet by name.
    pub fn get(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Number of sheets.
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    /// Whether the workbook has no sheets.
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Write every sheet into `dir` (created if needed) and the sheet index.
    ///
    /// Returns the paths of the sheet files, in sheet order.
    pub fn write(&self, dir: &Path, format: ExportFormat) -> Result<Vec<PathBuf>, ExportError> {
        fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.sheets.len());
        for sheet in &self.sheets {
            let path = dir.join(format!("{}.{}", sheet.name, format.extension()));
            sheet.export_to_file(&path, format)?;
            debug!(sheet = %sheet.name, rows = sheet.frame.height(), path = %path.display(), "Wrote sheet");
            written.push(path);
        }

        let index: String = self
            .sheets
            .iter()
            .map(|s| format!("{}\n", s.name))
            .collect();
        fs::write(dir.join(SHEET_INDEX), index)?;

        info!(dir = %dir.display(), sheets = self.sheets.len(), "Wrote workbook");
        Ok(written)
    }
}

/// Read the sheet order of a workbook directory.
pub fn read_sheet_index(dir: &Path) -> Result<Vec<String>, ExportError> {
    let content = fs::read_to_string(dir.join(SHEET_INDEX))?;
    Ok(content
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

fn validate_sheet_name(name: &str) -> Result<(), ExportError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if invalid {
        return Err(ExportError::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

/// Single exported cell.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    fn to_csv(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

fn column_cells(series: &Series) -> PolarsResult<Vec<Cell>> {
    let cells = match series.dtype() {
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Bool))
            .collect(),
        dtype if dtype.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Int))
            .collect(),
        dtype if dtype.is_float() => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, Cell::Float))
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map_or(Cell::Null, |s| Cell::Text(s.to_string())))
            .collect(),
    };
    Ok(cells)
}

fn frame_cells(df: &DataFrame) -> PolarsResult<Vec<Vec<Cell>>> {
    df.get_columns()
        .iter()
        .map(|c| column_cells(c.as_materialized_series()))
        .collect()
}

/// Render a frame in the given format.
///
/// CSV has a header row and empty fields for nulls. JSON is an array of
/// records keyed by column name, in column order; non-finite floats are null.
pub fn frame_to_string(df: &DataFrame, format: ExportFormat) -> Result<String, ExportError> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();
    let columns = frame_cells(df)?;

    match format {
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(vec![]);
            wtr.write_record(&names)?;
            for row in 0..df.height() {
                wtr.write_record(columns.iter().map(|c| c[row].to_csv()))?;
            }
            let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
            String::from_utf8(bytes).map_err(|e| {
                ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })
        }
        ExportFormat::Json | ExportFormat::PrettyJson => {
            let records: Vec<Value> = (0..df.height())
                .map(|row| {
                    let record: Map<String, Value> = names
                        .iter()
                        .zip(&columns)
                        .map(|(name, column)| (name.clone(), column[row].to_json()))
                        .collect();
                    Value::Object(record)
                })
                .collect();
            if format == ExportFormat::PrettyJson {
                Ok(serde_json::to_string_pretty(&records)?)
            } else {
                Ok(serde_json::to_string(&records)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn frame() -> DataFrame {
        df!(
            "Sector" => &["Banking", "Luxury"],
            "Return" => &[Some(0.01), None],
            "Count" => &[3u32, 4]
        )
        .unwrap()
    }

    #[test]
    fn test_csv_keeps_row_order_and_blanks_nulls() {
        let csv = frame_to_string(&frame(), ExportFormat::Csv).unwrap();
        assert_eq!(csv, "Sector,Return,Count\nBanking,0.01,3\nLuxury,,4\n");
    }

    #[test]
    fn test_json_records() {
        let json = frame_to_string(&frame(), ExportFormat::Json).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["Sector"], "Banking");
        assert_eq!(parsed[0]["Count"], 3);
        assert!(parsed[1]["Return"].is_null());
    }

    #[test]
    fn test_non_finite_floats_become_json_null() {
        let df = df!("x" => &[f64::NAN, 1.5]).unwrap();
        let json = frame_to_string(&df, ExportFormat::Json).unwrap();
        assert_eq!(json, r#"[{"x":null},{"x":1.5}]"#);
    }

    #[rstest]
    #[case("")]
    #[case("  ")]
    #[case("a/b")]
    #[case("..")]
    #[case("tab\there")]
    fn test_invalid_sheet_names(#[case] name: &str) {
        assert!(matches!(
            Sheet::new(name, frame()),
            Err(ExportError::InvalidSheetName(_))
        ));
    }

    #[test]
    fn test_workbook_replaces_same_name_in_place() {
        let mut book = Workbook::new();
        book.add("a", frame()).unwrap();
        book.add("b", frame()).unwrap();
        book.add("a", df!("x" => &[1i64]).unwrap()).unwrap();

        let names: Vec<&str> = book.sheets().iter().map(Sheet::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(book.get("a").unwrap().frame().width(), 1);
    }

    #[test]
    fn test_workbook_written_with_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut book = Workbook::new();
        book.add("regression", frame()).unwrap();
        book.add("mean_by_sector", frame()).unwrap();

        let paths = book.write(dir.path(), ExportFormat::Csv).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("regression.csv"));
        assert_eq!(
            read_sheet_index(dir.path()).unwrap(),
            vec!["regression", "mean_by_sector"]
        );

        let content = fs::read_to_string(&paths[1]).unwrap();
        assert!(content.starts_with("Sector,Return,Count\n"));
    }
}
