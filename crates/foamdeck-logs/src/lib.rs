//! Solver output processing for foamdeck
//!
//! This crate provides line parsing, residual series tracking, and process
//! output streaming.

mod monitor;
mod parser;
mod series;
mod stream;

pub use monitor::{DisplaySink, SolverMonitor};
pub use parser::LineParser;
pub use series::{ResidualSeries, SeriesStore, SharedSeriesStore};
pub use stream::{OutputLine, OutputStreamManager, StreamKind};

// Re-export types used in our public API
pub use foamdeck_types::{SeriesColor, SolverEvent};
