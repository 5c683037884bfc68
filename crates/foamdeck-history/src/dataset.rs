//! Flat per-run dataset for reporting and export

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;

use foamdeck_types::{RunRecord, RunStatus, timestamp};

/// Cloud dictionary relative to the case directory
pub const CLOUD_PROPERTIES: &str = "constant/cloudProperties";

/// One run flattened with its cloud properties and final cloud metrics
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetRow {
    pub solver: String,
    pub case_path: String,
    #[serde(with = "timestamp")]
    pub start_time: NaiveDateTime,
    #[serde(with = "timestamp")]
    pub end_time: NaiveDateTime,
    pub status: RunStatus,

    /// Numeric entries of `constant/cloudProperties`
    #[serde(flatten)]
    pub properties: BTreeMap<String, f64>,

    pub max_cell_volume_fraction: Option<f64>,
    pub linear_kinetic_energy: Option<f64>,
}

/// Last values of the cloud metrics found in a log excerpt
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExcerptMetrics {
    pub max_cell_volume_fraction: Option<f64>,
    pub linear_kinetic_energy: Option<f64>,
}

/// Scanner for cloud metrics in log excerpts
pub struct MetricScanner {
    max_alpha: Regex,
    kinetic_energy: Regex,
}

impl MetricScanner {
    pub fn new() -> Self {
        const NUMBER: &str = r"[-+]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][-+]?[0-9]+)?";
        Self {
            max_alpha: Regex::new(&format!(r"Max cell volume fraction\s*=\s*({NUMBER})"))
                .expect("built-in metric pattern must compile"),
            kinetic_energy: Regex::new(&format!(r"Linear kinetic energy\s*=\s*({NUMBER})"))
                .expect("built-in metric pattern must compile"),
        }
    }

    /// Scan lines keeping the last occurrence of each metric
    pub fn scan(&self, lines: &[String]) -> ExcerptMetrics {
        let mut metrics = ExcerptMetrics::default();
        for line in lines {
            if let Some(value) = last_number(&self.max_alpha, line) {
                metrics.max_cell_volume_fraction = Some(value);
            }
            if let Some(value) = last_number(&self.kinetic_energy, line) {
                metrics.linear_kinetic_energy = Some(value);
            }
        }
        metrics
    }

    /// Build the dataset row for one run
    pub fn row(&self, record: &RunRecord) -> DatasetRow {
        let metrics = self.scan(record.excerpt());
        DatasetRow {
            solver: record.solver.clone(),
            case_path: record.case_path.clone(),
            start_time: record.start_time,
            end_time: record.end_time,
            status: record.status,
            properties: read_cloud_properties(Path::new(&record.case_path)),
            max_cell_volume_fraction: metrics.max_cell_volume_fraction,
            linear_kinetic_energy: metrics.linear_kinetic_energy,
        }
    }
}

impl Default for MetricScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn last_number(re: &Regex, line: &str) -> Option<f64> {
    re.captures_iter(line)
        .filter_map(|caps| caps[1].parse().ok())
        .last()
}

/// Read numeric entries of `<case>/constant/cloudProperties`
///
/// A missing or unreadable file yields an empty map.
pub fn read_cloud_properties(case_path: &Path) -> BTreeMap<String, f64> {
    let path = case_path.join(CLOUD_PROPERTIES);
    match fs::read(&path) {
        Ok(bytes) => parse_cloud_properties(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to read cloudProperties");
            }
            BTreeMap::new()
        }
    }
}

/// Parse `name value;` lines of an OpenFOAM dictionary, keeping numeric values
///
/// Sub-dictionaries are flattened, a later entry replaces an earlier one with
/// the same name.
pub fn parse_cloud_properties(text: &str) -> BTreeMap<String, f64> {
    let mut properties = BTreeMap::new();

    for line in text.lines() {
        let line = line.split("//").next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let (Some(name), Some(raw), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            continue;
        };

        let raw = raw.strip_suffix(';').unwrap_or(raw);
        if let Ok(value) = raw.parse::<f64>() {
            properties.insert(name.to_string(), value);
        }
    }

    properties
}

/// Write dataset rows as CSV, property columns sorted by name
pub fn write_dataset_csv<W: Write>(rows: &[DatasetRow], mut writer: W) -> io::Result<()> {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|row| row.properties.keys().map(String::as_str))
        .collect();

    let mut header: Vec<Cow<'_, str>> = ["solver", "case_path", "start_time", "end_time", "status"]
        .into_iter()
        .map(Cow::Borrowed)
        .collect();
    header.extend(columns.iter().map(|column| csv_field(column)));
    header.push(Cow::Borrowed("max_cell_volume_fraction"));
    header.push(Cow::Borrowed("linear_kinetic_energy"));
    writeln!(writer, "{}", header.join(","))?;

    for row in rows {
        let mut cells = vec![
            csv_field(&row.solver).into_owned(),
            csv_field(&row.case_path).into_owned(),
            row.start_time.format(timestamp::FORMAT).to_string(),
            row.end_time.format(timestamp::FORMAT).to_string(),
            row.status.to_string(),
        ];
        for column in &columns {
            cells.push(optional_cell(row.properties.get(*column).copied()));
        }
        cells.push(optional_cell(row.max_cell_volume_fraction));
        cells.push(optional_cell(row.linear_kinetic_energy));
        writeln!(writer, "{}", cells.join(","))?;
    }

    writer.flush()
}

/// Quote a field holding a separator, quote or line break, doubling quotes
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn optional_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
