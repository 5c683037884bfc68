//! Simulation run history for foamdeck
//!
//! This crate persists run records, extracts the final cloud block from solver
//! logs, and derives a flat per-run dataset for reporting.

mod dataset;
mod error;
mod excerpt;
mod history;

pub use dataset::{
    CLOUD_PROPERTIES, DatasetRow, ExcerptMetrics, MetricScanner, parse_cloud_properties,
    read_cloud_properties, write_dataset_csv,
};
pub use error::{HistoryError, HistoryResult};
pub use excerpt::{LOG_FILE, last_cloud_block, read_last_cloud_block};
pub use history::{HISTORY_FILE, NewRun, RunHistory};

// Re-export types used in our public API
pub use foamdeck_types::{RunRecord, RunStatus};
