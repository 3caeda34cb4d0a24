//! Ingestion of the three raw semicolon-delimited sources.

use crate::error::{DataError, Result};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Field delimiter shared by every raw source.
pub const FIELD_DELIMITER: u8 = b';';

/// Locations of the raw sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFiles {
    /// Per-ticker price series
    pub prices: PathBuf,
    /// Macro rate series
    pub macro_rates: PathBuf,
    /// Static ticker → sector table
    pub sectors: PathBuf,
}

impl SourceFiles {
    /// Resolve the three file names against an input directory.
    pub fn in_dir(
        dir: impl AsRef<Path>,
        prices: impl AsRef<Path>,
        macro_rates: impl AsRef<Path>,
        sectors: impl AsRef<Path>,
    ) -> Self {
        let dir = dir.as_ref();
        Self {
            prices: dir.join(prices),
            macro_rates: dir.join(macro_rates),
            sectors: dir.join(sectors),
        }
    }
}

/// Raw tables exactly as read from disk.
#[derive(Debug, Clone)]
pub struct RawTables {
    /// Price series
    pub prices: DataFrame,
    /// Macro series, with the provider's own column names
    pub macro_rates: DataFrame,
    /// Sector table
    pub sectors: DataFrame,
}

/// Read all three sources.
pub fn extract(files: &SourceFiles) -> Result<RawTables> {
    let prices = read_delimited(&files.prices)?;
    let macro_rates = read_delimited(&files.macro_rates)?;
    let sectors = read_delimited(&files.sectors)?;

    info!(
        prices = prices.height(),
        macro_rates = macro_rates.height(),
        sectors = sectors.height(),
        "Extracted raw sources"
    );

    Ok(RawTables {
        prices,
        macro_rates,
        sectors,
    })
}

/// Read one semicolon-delimited file with a header row.
///
/// Every column is read as text. Typing is left to [`coerce`](crate::frame::coerce)
/// with the declared column types, so a value is only nulled when it is
/// itself malformed.
pub fn read_delimited(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(DataError::Source {
            path: path.to_path_buf(),
            reason: "file does not exist".to_string(),
        });
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_separator(FIELD_DELIMITER))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| DataError::Source {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "Read delimited source"
    );

    Ok(df)
}
