//! Error types for data operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
///
/// Value-level problems never surface here: a cell that does not fit its
/// declared type becomes null. Only structural and I/O failures are errors.
#[derive(Debug, Error)]
pub enum DataError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source file could not be read
    #[error("Cannot read source {path}: {reason}")]
    Source {
        /// Path of the source file
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// A column required by a transformation is absent
    #[error("Missing column '{column}' in table '{table}'")]
    MissingColumn {
        /// Table being processed
        table: String,
        /// Column that was expected
        column: String,
    },

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Table not present in the store
    #[error("Table not found in store: {0}")]
    TableNotFound(String),
}

impl DataError {
    /// Whether this error comes from a file or database adapter.
    pub const fn is_adapter_io(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Io(_) | Self::Source { .. } | Self::TableNotFound(_)
        )
    }
}
