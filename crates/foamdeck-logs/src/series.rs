use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use foamdeck_types::SeriesColor;

/// Residual samples for one field, index-aligned with the time axis
#[derive(Clone, Debug)]
pub struct ResidualSeries {
    pub name: String,
    pub color: SeriesColor,
    /// `None` marks a time step without a sample
    pub values: Vec<Option<f64>>,
}

/// Time-indexed residual and diagnostic series
///
/// Every series is positionally aligned with `times`: index `i` of any series
/// belongs to `times[i]`. Samples that arrive out of step are clamped back into
/// alignment instead of being rejected, so a missed or duplicated log line
/// never aborts a monitoring session.
#[derive(Clone, Debug, Default)]
pub struct SeriesStore {
    /// Distinct times in order of first appearance
    times: Vec<f64>,

    /// Residual series in first-seen order
    series: Vec<ResidualSeries>,

    /// Field name -> position in `series`
    index: HashMap<String, usize>,

    /// Max cloud alpha per time step
    diagnostic: Vec<Option<f64>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a time marker; repeated values are ignored
    pub fn record_time(&mut self, t: f64) {
        if self.times.contains(&t) {
            return;
        }
        self.times.push(t);
        if self.diagnostic.len() < self.times.len() {
            self.diagnostic.push(None);
        }
    }

    /// Record a residual sample against the most recent time
    pub fn record_residual(&mut self, name: &str, value: f64) {
        if self.times.is_empty() {
            tracing::debug!(field = name, "residual before first time marker ignored");
            return;
        }
        let slot = self.times.len() - 1;

        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => self.register(name),
        };
        let values = &mut self.series[idx].values;

        if values.len() > slot {
            // Current slot already filled (several correctors per step)
            values.truncate(slot);
        }
        values.resize(slot, None);
        values.push(Some(value));
    }

    /// Record the diagnostic scalar for the most recent time
    pub fn record_diagnostic(&mut self, value: f64) {
        let len = self.times.len();
        if len == 0 {
            return;
        }

        if self.diagnostic.len() == len {
            self.diagnostic[len - 1] = Some(value);
        } else if self.diagnostic.len() < len {
            self.diagnostic.resize(len - 1, None);
            self.diagnostic.push(Some(value));
        } else {
            tracing::debug!(
                diagnostic = self.diagnostic.len(),
                times = len,
                "diagnostic series ahead of time axis, clamping"
            );
            self.diagnostic.truncate(len - 1);
            self.diagnostic.push(Some(value));
        }
    }

    fn register(&mut self, name: &str) -> usize {
        let idx = self.series.len();
        // Color follows the variable count after registration
        let color = SeriesColor::from_index(idx + 1);
        self.series.push(ResidualSeries {
            name: name.to_string(),
            color,
            values: Vec::new(),
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// `(time, value)` pairs of a series, skipping gaps
    pub fn project_series(&self, name: &str) -> Vec<(f64, f64)> {
        match self.index.get(name) {
            Some(&idx) => project(&self.times, &self.series[idx].values),
            None => Vec::new(),
        }
    }

    /// `(time, value)` pairs of the diagnostic series, skipping gaps
    pub fn project_diagnostic(&self) -> Vec<(f64, f64)> {
        project(&self.times, &self.diagnostic)
    }

    /// Clear everything, including palette assignments
    pub fn reset(&mut self) {
        self.times.clear();
        self.series.clear();
        self.index.clear();
        self.diagnostic.clear();
    }

    /// Write all residual series as CSV, one row per time step
    pub fn export_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut header = String::from("Time");
        for series in &self.series {
            header.push(',');
            header.push_str(&series.name);
        }
        writeln!(writer, "{}", header)?;

        for (i, time) in self.times.iter().enumerate() {
            let mut row = time.to_string();
            for series in &self.series {
                row.push(',');
                if let Some(Some(value)) = series.values.get(i) {
                    row.push_str(&value.to_string());
                }
            }
            writeln!(writer, "{}", row)?;
        }

        writer.flush()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Residual series in first-seen order
    pub fn series(&self) -> &[ResidualSeries] {
        &self.series
    }

    pub fn get(&self, name: &str) -> Option<&ResidualSeries> {
        self.index.get(name).map(|&idx| &self.series[idx])
    }

    pub fn diagnostic(&self) -> &[Option<f64>] {
        &self.diagnostic
    }

    /// Field names in first-seen order
    pub fn variables(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

fn project(times: &[f64], values: &[Option<f64>]) -> Vec<(f64, f64)> {
    times
        .iter()
        .zip(values)
        .filter_map(|(t, v)| v.map(|v| (*t, v)))
        .collect()
}

/// Cloneable handle to a series store guarded by a single mutex
#[derive(Clone, Default)]
pub struct SharedSeriesStore {
    inner: Arc<Mutex<SeriesStore>>,
}

impl SharedSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the store for a batch of reads or updates
    pub fn lock(&self) -> MutexGuard<'_, SeriesStore> {
        self.inner.lock()
    }

    pub fn record_time(&self, t: f64) {
        self.inner.lock().record_time(t);
    }

    pub fn record_residual(&self, name: &str, value: f64) {
        self.inner.lock().record_residual(name, value);
    }

    pub fn record_diagnostic(&self, value: f64) {
        self.inner.lock().record_diagnostic(value);
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Copy of the current state (for rendering or export off the hot path)
    pub fn snapshot(&self) -> SeriesStore {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_time_is_idempotent() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.record_time(0.1);
        assert_eq!(store.times(), &[0.1]);
        assert_eq!(store.diagnostic(), &[None]);
    }

    #[test]
    fn test_time_axis_keeps_arrival_order() {
        let mut store = SeriesStore::new();
        store.record_time(0.3);
        store.record_time(0.1);
        store.record_time(0.3);
        store.record_time(0.2);
        assert_eq!(store.times(), &[0.3, 0.1, 0.2]);
    }

    #[test]
    fn test_new_variable_is_backfilled() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.record_time(0.2);
        store.record_time(0.3);
        store.record_residual("p", 0.5);

        let series = store.get("p").unwrap();
        assert_eq!(series.values, vec![None, None, Some(0.5)]);
        assert_eq!(store.project_series("p"), vec![(0.3, 0.5)]);
    }

    #[test]
    fn test_residual_before_time_is_ignored() {
        let mut store = SeriesStore::new();
        store.record_residual("Ux", 1.0);
        assert!(store.series().is_empty());
    }

    #[test]
    fn test_repeated_residual_overwrites_current_slot() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.record_residual("p", 0.5);
        store.record_residual("p", 0.25);
        assert_eq!(store.get("p").unwrap().values, vec![Some(0.25)]);
    }

    #[test]
    fn test_palette_follows_registration_count() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        for name in ["Ux", "Uy", "p", "k", "epsilon", "omega", "nut", "alpha"] {
            store.record_residual(name, 1.0);
        }
        let colors: Vec<_> = store.series().iter().map(|s| s.color).collect();
        assert_eq!(colors[0], SeriesColor::Green);
        assert_eq!(colors[5], SeriesColor::White);
        assert_eq!(colors[6], SeriesColor::Red);
        assert_eq!(colors[7], SeriesColor::Green);
    }

    #[test]
    fn test_diagnostic_last_write_wins() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.record_diagnostic(0.2);
        store.record_diagnostic(0.7);
        assert_eq!(store.project_diagnostic(), vec![(0.1, 0.7)]);
    }

    #[test]
    fn test_diagnostic_without_time_is_ignored() {
        let mut store = SeriesStore::new();
        store.record_diagnostic(0.5);
        assert!(store.diagnostic().is_empty());
    }

    #[test]
    fn test_diagnostic_backfills_gaps() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.diagnostic.clear();
        store.times.push(0.2);
        store.times.push(0.3);
        store.record_diagnostic(0.4);
        assert_eq!(store.diagnostic(), &[None, None, Some(0.4)]);
    }

    #[test]
    fn test_diagnostic_clamps_when_ahead() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.diagnostic = vec![Some(1.0), Some(2.0), Some(3.0)];
        store.record_diagnostic(0.9);
        assert_eq!(store.diagnostic(), &[Some(0.9)]);
    }

    #[test]
    fn test_reset_returns_to_empty() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.record_residual("p", 0.5);
        store.record_diagnostic(0.3);
        store.reset();

        assert!(store.is_empty());
        assert!(store.series().is_empty());
        assert!(store.diagnostic().is_empty());
        assert!(store.project_series("p").is_empty());

        store.record_time(0.1);
        store.record_residual("k", 0.5);
        assert_eq!(store.get("k").unwrap().color, SeriesColor::Green);
    }

    #[test]
    fn test_export_csv_layout() {
        let mut store = SeriesStore::new();
        store.record_time(0.1);
        store.record_residual("Ux", 0.5);
        store.record_time(0.2);
        store.record_residual("p", 0.25);
        store.record_residual("Ux", 0.125);
        store.record_time(0.3);

        let mut out = Vec::new();
        store.export_csv(&mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();

        assert_eq!(csv, "Time,Ux,p\n0.1,0.5,\n0.2,0.125,0.25\n0.3,,\n");
    }

    #[test]
    fn test_export_csv_reparses_to_projection() {
        let mut store = SeriesStore::new();
        let samples = [
            (0.001, Some(1.0), None),
            (0.002, Some(0.31), Some(0.9)),
            (0.003, None, Some(1e-7)),
            (0.004, Some(2.5e-5), Some(0.12)),
        ];
        for (t, ux, p) in samples {
            store.record_time(t);
            if let Some(v) = ux {
                store.record_residual("Ux", v);
            }
            if let Some(v) = p {
                store.record_residual("p", v);
            }
        }

        let mut out = Vec::new();
        store.export_csv(&mut out).unwrap();
        let csv = String::from_utf8(out).unwrap();

        let mut lines = csv.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        let mut parsed: Vec<Vec<(f64, f64)>> = vec![Vec::new(); header.len() - 1];
        for line in lines {
            let cells: Vec<&str> = line.split(',').collect();
            let t: f64 = cells[0].parse().unwrap();
            for (col, cell) in cells[1..].iter().enumerate() {
                if !cell.is_empty() {
                    parsed[col].push((t, cell.parse().unwrap()));
                }
            }
        }

        for (col, name) in header[1..].iter().enumerate() {
            assert_eq!(parsed[col], store.project_series(name));
        }
    }

    #[test]
    fn test_shared_store_handles_share_state() {
        let shared = SharedSeriesStore::new();
        let other = shared.clone();
        shared.record_time(0.5);
        other.record_residual("p", 1e-3);
        other.record_diagnostic(0.4);

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.project_series("p"), vec![(0.5, 1e-3)]);
        assert_eq!(shared.lock().project_diagnostic(), vec![(0.5, 0.4)]);
    }
}
