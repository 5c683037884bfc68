//! Cloud block extraction from solver logs

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Solver log written by `foamRun` into the case directory
pub const LOG_FILE: &str = "log.foamRun";

const BLOCK_START: &str = "Solving 2-D cloud cloud";
const BLOCK_HEADER: &str = "Cloud: cloud";

/// Read `<case>/log.foamRun` and extract its last cloud block
///
/// Returns `None` when the log does not exist (or cannot be read), and an
/// empty block when the log holds no cloud block.
pub fn read_last_cloud_block(case_path: &Path) -> Option<Vec<String>> {
    let log_path = case_path.join(LOG_FILE);
    let bytes = match fs::read(&log_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %log_path.display(), error = %e, "failed to read solver log");
            return None;
        }
    };

    Some(last_cloud_block(&String::from_utf8_lossy(&bytes)))
}

/// Last `Solving 2-D cloud cloud` block directly followed by `Cloud: cloud`
///
/// The block ends before the next `Solving 2-D cloud cloud` line or at the end
/// of the log. Lines are right-trimmed.
pub fn last_cloud_block(log: &str) -> Vec<String> {
    let lines: Vec<&str> = log.lines().collect();

    let start = (0..lines.len().saturating_sub(1))
        .rev()
        .find(|&i| lines[i].starts_with(BLOCK_START) && lines[i + 1].starts_with(BLOCK_HEADER));
    let Some(start) = start else {
        return Vec::new();
    };

    let end = lines[start + 1..]
        .iter()
        .position(|line| line.starts_with(BLOCK_START))
        .map_or(lines.len(), |offset| start + 1 + offset);

    lines[start..end]
        .iter()
        .map(|line| line.trim_end().to_string())
        .collect()
}
