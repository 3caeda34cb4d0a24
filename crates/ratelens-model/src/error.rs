//! Error types for the model engines.

use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by the join, metric, regression and pivot engines.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Data layer error
    #[error(transparent)]
    Data(#[from] ratelens_data::DataError),

    /// A column an engine depends on is absent
    #[error("Missing column '{0}'")]
    MissingColumn(String),

    /// Invalid engine parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Regression could not be fitted
    #[error("Regression fit failed: {0}")]
    Fit(#[from] FitError),
}

/// Reasons an OLS fit is impossible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FitError {
    /// Nothing left after dropping incomplete rows
    #[error("no eligible observations")]
    NoObservations,

    /// Design matrix columns are linearly dependent
    #[error("design matrix is rank deficient (column '{column}')")]
    RankDeficient {
        /// Column whose pivot vanished
        column: String,
    },

    /// No residual degrees of freedom
    #[error("need more than {parameters} observations, got {observations}")]
    InsufficientDegreesOfFreedom {
        /// Number of usable rows
        observations: usize,
        /// Number of estimated parameters
        parameters: usize,
    },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },
}
