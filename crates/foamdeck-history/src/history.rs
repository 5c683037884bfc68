use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use parking_lot::Mutex;

use foamdeck_types::{RunRecord, RunStatus};

use crate::dataset::{DatasetRow, MetricScanner};
use crate::excerpt::read_last_cloud_block;
use crate::{HistoryError, HistoryResult};

/// Default history file name
pub const HISTORY_FILE: &str = "simulation_history.json";

/// Metadata for a run about to be recorded
#[derive(Clone, Debug)]
pub struct NewRun {
    pub solver: String,
    pub case_path: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: RunStatus,
    pub notes: String,
}

/// Append-only run history persisted as a JSON document
///
/// Every query reads the whole file and every mutation rewrites it; nothing
/// is cached in memory.
pub struct RunHistory {
    path: PathBuf,

    /// Serializes load-modify-save cycles
    write_lock: Mutex<()>,
}

impl RunHistory {
    /// Open a history backed by `path`; the file is created on first write
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a run, attaching the last cloud block of its solver log
    pub fn add_entry(&self, run: NewRun) -> HistoryResult<RunRecord> {
        let log_data = read_last_cloud_block(Path::new(&run.case_path));
        let record = RunRecord {
            solver: run.solver,
            case_path: run.case_path,
            start_time: run.start_time,
            end_time: run.end_time,
            status: run.status,
            notes: run.notes,
            log_data,
        };

        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        records.push(record.clone());
        self.save(&records)?;

        tracing::info!(
            solver = %record.solver,
            status = %record.status,
            entries = records.len(),
            "run recorded"
        );
        Ok(record)
    }

    /// All recorded runs, oldest first
    pub fn history(&self) -> HistoryResult<Vec<RunRecord>> {
        self.load()
    }

    /// A single run by position
    pub fn get(&self, index: usize) -> HistoryResult<RunRecord> {
        let mut records = self.load()?;
        let len = records.len();
        if index >= len {
            return Err(HistoryError::IndexOutOfRange { index, len });
        }
        Ok(records.swap_remove(index))
    }

    /// Remove one run by position, returning it
    pub fn delete_entry(&self, index: usize) -> HistoryResult<RunRecord> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        let len = records.len();
        if index >= len {
            return Err(HistoryError::IndexOutOfRange { index, len });
        }

        let removed = records.remove(index);
        self.save(&records)?;
        tracing::info!(index, entries = records.len(), "run deleted");
        Ok(removed)
    }

    /// Remove every run; the file is kept and holds an empty list
    pub fn clear_all(&self) -> HistoryResult<()> {
        let _guard = self.write_lock.lock();
        self.save(&[])?;
        tracing::info!("history cleared");
        Ok(())
    }

    /// Flatten every run with its cloud properties and final cloud metrics
    pub fn derive_dataset(&self) -> HistoryResult<Vec<DatasetRow>> {
        let scanner = MetricScanner::new();
        Ok(self.load()?.iter().map(|record| scanner.row(record)).collect())
    }

    fn load(&self) -> HistoryResult<Vec<RunRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|source| HistoryError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Write to a sibling temp file, then rename over the target
    fn save(&self, records: &[RunRecord]) -> HistoryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| HISTORY_FILE.into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let content = serde_json::to_string_pretty(records)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excerpt::LOG_FILE;
    use foamdeck_types::timestamp;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, timestamp::FORMAT).unwrap()
    }

    fn run(solver: &str, case_path: &Path, status: RunStatus) -> NewRun {
        NewRun {
            solver: solver.to_string(),
            case_path: case_path.display().to_string(),
            start_time: at("2024-01-15 10:00:00"),
            end_time: at("2024-01-15 10:30:00"),
            status,
            notes: String::new(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path().join(HISTORY_FILE));
        assert!(history.history().unwrap().is_empty());
    }

    #[test]
    fn test_add_entry_persists_last_cloud_block() {
        let dir = tempfile::tempdir().unwrap();
        let case = dir.path().join("case");
        fs::create_dir_all(&case).unwrap();
        fs::write(
            case.join(LOG_FILE),
            "Solving 2-D cloud cloud\nCloud: cloud\n    first\n\
             Time = 2\n\
             Solving 2-D cloud cloud\nCloud: cloud   \n    second   \nEnd\n",
        )
        .unwrap();

        let history = RunHistory::open(dir.path().join(HISTORY_FILE));
        history
            .add_entry(run("denseParticleFoam", &case, RunStatus::Finished))
            .unwrap();

        let reopened = RunHistory::open(dir.path().join(HISTORY_FILE));
        let records = reopened.history().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].log_data,
            Some(vec![
                "Solving 2-D cloud cloud".to_string(),
                "Cloud: cloud".to_string(),
                "    second".to_string(),
                "End".to_string(),
            ])
        );
    }

    #[test]
    fn test_add_entry_without_log_has_no_excerpt() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path().join(HISTORY_FILE));
        let record = history
            .add_entry(run("icoFoam", dir.path(), RunStatus::Interrupted))
            .unwrap();
        assert_eq!(record.log_data, None);
        assert_eq!(record.status, RunStatus::Interrupted);
    }

    #[test]
    fn test_delete_keeps_relative_order() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path().join(HISTORY_FILE));
        for solver in ["a", "b", "c", "d"] {
            history
                .add_entry(run(solver, dir.path(), RunStatus::Finished))
                .unwrap();
        }

        let removed = history.delete_entry(1).unwrap();
        assert_eq!(removed.solver, "b");

        let solvers: Vec<String> = history
            .history()
            .unwrap()
            .into_iter()
            .map(|r| r.solver)
            .collect();
        assert_eq!(solvers, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_delete_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::open(dir.path().join(HISTORY_FILE));
        let err = history.delete_entry(0).unwrap_err();
        assert!(matches!(err, HistoryError::IndexOutOfRange { index: 0, len: 0 }));
    }

    #[test]
    fn test_clear_all_writes_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HISTORY_FILE);
        let history = RunHistory::open(&path);
        history
            .add_entry(run("a", dir.path(), RunStatus::Finished))
            .unwrap();

        history.clear_all().unwrap();
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "[]");
        assert!(history.history().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(HISTORY_FILE);
        fs::write(&path, "{ not json").unwrap();

        let history = RunHistory::open(&path);
        let err = history.history().unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { .. }));
        assert!(err.to_string().contains(HISTORY_FILE));

        // Mutations must not overwrite a file that failed to load
        assert!(history.add_entry(run("a", dir.path(), RunStatus::Finished)).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_derive_dataset_merges_properties_and_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let case = dir.path().join("case");
        fs::create_dir_all(case.join("constant")).unwrap();
        fs::write(
            case.join("constant/cloudProperties"),
            "rho0 2526;\ntype collidingCloud;\n// comment 1;\n",
        )
        .unwrap();
        fs::write(
            case.join(LOG_FILE),
            "Solving 2-D cloud cloud\nCloud: cloud\n    Max cell volume fraction = 0.61\n",
        )
        .unwrap();

        let history = RunHistory::open(dir.path().join(HISTORY_FILE));
        history
            .add_entry(run("denseParticleFoam", &case, RunStatus::Finished))
            .unwrap();
        history
            .add_entry(run("denseParticleFoam", dir.path(), RunStatus::Interrupted))
            .unwrap();

        let rows = history.derive_dataset().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].properties.get("rho0"), Some(&2526.0));
        assert_eq!(rows[0].properties.len(), 1);
        assert_eq!(rows[0].max_cell_volume_fraction, Some(0.61));
        assert_eq!(rows[0].linear_kinetic_energy, None);
        assert!(rows[1].properties.is_empty());
        assert_eq!(rows[1].max_cell_volume_fraction, None);
    }
}
