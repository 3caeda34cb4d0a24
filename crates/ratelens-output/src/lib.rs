#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/ratelens/ratelens/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod summary;

pub use export::{
    ExportError, ExportFormat, Exporter, SHEET_INDEX, Sheet, Workbook, frame_to_string,
    read_sheet_index,
};
pub use summary::{SectorHighlights, frame_table, regression_table, sector_means_table};
