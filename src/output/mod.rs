//! Output module for operator-facing views of the record set
//!
//! This module handles:
//! - The plain-text CSV export written alongside every snapshot
//! - Statistics and checkpoint summaries for the `--status` mode

mod export;
pub mod stats;

pub use export::{export_columns, write_csv, write_csv_export};
pub use stats::{compute_statistics, print_statistics, PageStatistics, RecordStatistics};
