#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/ratelens/ratelens/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod pipeline;
pub mod universe;

// Re-export main types from sub-crates
pub use ratelens_data as data;
pub use ratelens_model as model;
pub use ratelens_output as output;

pub use config::{Config, ConfigError, ResolvedPaths};
pub use pipeline::{
    Analysis, EtlOutcome, PipelineError, Result, analyze, final_workbook, run_analysis, run_etl,
};
pub use universe::{Cac40Universe, Sector, Universe};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
