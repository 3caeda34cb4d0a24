#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/ratelens/ratelens/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod ingest;
pub mod schema;
pub mod store;
pub mod transform;

pub use error::{DataError, Result};
pub use frame::{ColumnType, TypeMap, coerce, to_calendar_day};
pub use ingest::{RawTables, SourceFiles, extract, read_delimited};
pub use store::{TableStore, WriteMode};
pub use transform::{MacroLayout, SanityReport, TableNames, Tables, sanity_check, transform};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
