//! Shared types for foamdeck
//!
//! This crate contains data structures used across multiple foamdeck crates.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Solver Output Events
// ============================================================================

/// A structured event recognized in one line of solver output
#[derive(Clone, Debug, PartialEq)]
pub enum SolverEvent {
    /// `Time = <t>` marker starting a new time step
    Time(f64),

    /// `Initial residual` sample for one field
    Residual { field: String, value: f64 },

    /// `Max cell volume fraction = <v>` (max cloud alpha)
    Diagnostic(f64),

    /// Text destined for the profiling panel
    Profiling(String),
}

impl SolverEvent {
    /// Whether this event updates the series store
    pub fn is_series_update(&self) -> bool {
        !matches!(self, Self::Profiling(_))
    }
}

// ============================================================================
// Plot Palette
// ============================================================================

/// Fixed cyclic palette for residual series
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeriesColor {
    Red,
    Green,
    Blue,
    Cyan,
    Magenta,
    Yellow,
    White,
}

impl SeriesColor {
    /// All palette entries in cycle order
    pub const PALETTE: [SeriesColor; 7] = [
        Self::Red,
        Self::Green,
        Self::Blue,
        Self::Cyan,
        Self::Magenta,
        Self::Yellow,
        Self::White,
    ];

    /// Palette entry for an arbitrary index (wraps around)
    pub fn from_index(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }

    /// Short name, matches the single-letter pen codes of common plotting tools
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "r",
            Self::Green => "g",
            Self::Blue => "b",
            Self::Cyan => "c",
            Self::Magenta => "m",
            Self::Yellow => "y",
            Self::White => "w",
        }
    }
}

// ============================================================================
// Run History Types
// ============================================================================

/// Outcome of a simulation invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunStatus {
    Finished,
    #[serde(alias = "Interrompida")]
    Interrupted,
    #[default]
    Running,
}

impl RunStatus {
    /// Status for a finished process exit code
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Finished,
            _ => Self::Interrupted,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "Finished",
            Self::Interrupted => "Interrupted",
            Self::Running => "Running",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One historical simulation run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Solver binary name (e.g. `denseParticleFoam`)
    pub solver: String,

    /// Case directory the solver ran in
    pub case_path: String,

    #[serde(with = "timestamp")]
    pub start_time: NaiveDateTime,

    #[serde(with = "timestamp")]
    pub end_time: NaiveDateTime,

    pub status: RunStatus,

    #[serde(default)]
    pub notes: String,

    /// Last cloud block of `log.foamRun`, if the log existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_data: Option<Vec<String>>,
}

impl RunRecord {
    /// Wall-clock duration of the run
    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    /// Excerpt lines, empty when none was captured
    pub fn excerpt(&self) -> &[String] {
        self.log_data.as_deref().unwrap_or_default()
    }
}

/// Persisted timestamp format, `2024-01-15 10:30:00`
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        // Accept ISO 8601 as well, some tools rewrite the file
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .or_else(|_| raw.parse::<NaiveDateTime>())
            .map_err(de::Error::custom)
    }
}
