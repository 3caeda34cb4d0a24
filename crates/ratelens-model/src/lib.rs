#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/ratelens/ratelens/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod join;
pub mod linalg;
pub mod metrics;
pub mod pivot;
pub mod regression;

// Re-export main types
pub use error::{FitError, ModelError, Result};
pub use join::join;
pub use metrics::{MetricOptions, MetricsOutput, compute, derive_metrics};
pub use pivot::{AggFunc, PivotSpec, PivotTable, build_pivots};
pub use regression::{CoefficientRow, OlsFit, RegressionSummary, fit_return_regression, ols};
