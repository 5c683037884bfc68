use std::path::PathBuf;

use thiserror::Error;

/// Result type for run history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors raised by the run history store
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// History file exists but does not hold a record list
    #[error("Corrupt history file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No run at index {index} (history has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },
}
