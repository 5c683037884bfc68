//! Terminal output

use std::io::{self, Write};

use foamdeck_calc::{BrineProperties, LayerRateResult};
use foamdeck_history::{DatasetRow, RunRecord};
use foamdeck_logs::{DisplaySink, SeriesStore};
use foamdeck_types::timestamp;

use crate::runner::ProcessOutcome;

/// Writes solver output to stdout
///
/// In quiet mode only profiling lines are shown.
pub struct ConsoleSink<W: Write = io::Stdout> {
    out: W,
    quiet: bool,
}

impl ConsoleSink {
    pub fn stdout(quiet: bool) -> Self {
        Self::new(io::stdout(), quiet)
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, quiet: bool) -> Self {
        Self { out, quiet }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DisplaySink for ConsoleSink<W> {
    fn output(&mut self, line: &str) {
        if !self.quiet {
            // Broken pipe on stdout must not stop the monitor
            let _ = writeln!(self.out, "{line}");
        }
    }

    fn profiling(&mut self, text: &str) {
        let _ = writeln!(self.out, "[profiling] {text}");
    }
}

/// Per-variable summary: sample count, first, last and minimum residual
pub fn write_series_summary<W: Write>(store: &SeriesStore, mut out: W) -> io::Result<()> {
    let (Some(first), Some(last)) = (store.times().first(), store.times().last()) else {
        return writeln!(out, "No time steps found.");
    };
    writeln!(out, "{} time steps, t = {first} .. {last}", store.times().len())?;

    for series in store.series() {
        let samples: Vec<f64> = series.values.iter().flatten().copied().collect();
        let (Some(head), Some(tail)) = (samples.first(), samples.last()) else {
            continue;
        };
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        writeln!(
            out,
            "  {:<12} [{}] samples {:>6}  first {head:.3e}  last {tail:.3e}  min {min:.3e}",
            series.name,
            series.color.as_str(),
            samples.len(),
        )?;
    }

    if let Some(alpha) = store.diagnostic().iter().flatten().last() {
        writeln!(out, "  max cell volume fraction (last) {alpha}")?;
    }
    Ok(())
}

/// Final status line with output line counts
pub fn write_process_summary<W: Write>(outcome: &ProcessOutcome, mut out: W) -> io::Result<()> {
    write!(
        out,
        "Simulation {}. {} output lines",
        outcome.status, outcome.lines
    )?;
    if outcome.dropped_lines > 0 {
        write!(out, ", {} skipped (not UTF-8)", outcome.dropped_lines)?;
    }
    writeln!(out)
}

pub fn write_history_table<W: Write>(records: &[RunRecord], mut out: W) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "No simulations recorded.");
    }

    writeln!(
        out,
        "{:>3}  {:<20} {:<19}  {:<19}  {:<11}  {}",
        "#", "solver", "start", "end", "status", "case"
    )?;
    for (i, record) in records.iter().enumerate() {
        writeln!(
            out,
            "{i:>3}  {:<20} {:<19}  {:<19}  {:<11}  {}",
            record.solver,
            record.start_time.format(timestamp::FORMAT),
            record.end_time.format(timestamp::FORMAT),
            record.status.as_str(),
            record.case_path,
        )?;
    }
    Ok(())
}

pub fn write_record<W: Write>(index: usize, record: &RunRecord, mut out: W) -> io::Result<()> {
    writeln!(out, "Run #{index}")?;
    writeln!(out, "  solver   {}", record.solver)?;
    writeln!(out, "  case     {}", record.case_path)?;
    writeln!(out, "  start    {}", record.start_time.format(timestamp::FORMAT))?;
    writeln!(out, "  end      {}", record.end_time.format(timestamp::FORMAT))?;
    writeln!(out, "  duration {}s", record.duration().num_seconds())?;
    writeln!(out, "  status   {}", record.status)?;
    if !record.notes.is_empty() {
        writeln!(out, "  notes    {}", record.notes)?;
    }

    match &record.log_data {
        None => writeln!(out, "  (no solver log)"),
        Some(lines) if lines.is_empty() => writeln!(out, "  (no cloud block in log)"),
        Some(lines) => {
            writeln!(out)?;
            for line in lines {
                writeln!(out, "{line}")?;
            }
            Ok(())
        }
    }
}

pub fn write_dataset_table<W: Write>(rows: &[DatasetRow], mut out: W) -> io::Result<()> {
    for (i, row) in rows.iter().enumerate() {
        let alpha = row
            .max_cell_volume_fraction
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{i:>3}  {:<20} {:<11}  properties {:>3}  max alpha {alpha}",
            row.solver,
            row.status.as_str(),
            row.properties.len(),
        )?;
    }
    Ok(())
}

pub fn write_layer_result<W: Write>(result: &LayerRateResult, mut out: W) -> io::Result<()> {
    writeln!(out, "Nozzle layer:     {} cells, rate {:.6}", result.nozzle_layer_cells, result.rate_nozzle)?;
    writeln!(out, "Wall layer:       {} cells, rate {:.6}", result.wall_layer_cells, result.rate_wall)?;
    writeln!(
        out,
        "Transition layer: {} cells, rate {:.6}",
        result.transition_layer_cells, result.rate_trans
    )?;
    writeln!(out, "S_in = {:.6}, S_trans = {:.6}", result.s_in, result.s_trans)
}

pub fn write_brine<W: Write>(props: &BrineProperties, mut out: W) -> io::Result<()> {
    writeln!(out, "Temperature: {} °C", props.temperature_c)?;
    writeln!(out, "Pressure:    {} bar", props.pressure_bar)?;
    writeln!(out, "Salinity:    {:.6} (mass fraction)", props.mass_fraction)?;
    writeln!(out, "Density:     {:.2} kg/m³", props.density_kg_m3)?;
    writeln!(out, "Viscosity:   {:.6} mPa·s", props.viscosity_mpa_s)
}
