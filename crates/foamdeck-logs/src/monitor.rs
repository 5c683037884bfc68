use foamdeck_types::SolverEvent;

use crate::parser::LineParser;
use crate::series::SharedSeriesStore;

/// Destination for console and profiling text
pub trait DisplaySink {
    /// Every raw line, unchanged
    fn output(&mut self, line: &str);

    /// Profiling lines and solver performance notes
    fn profiling(&mut self, text: &str);
}

/// Line handler wiring the parser to a series store
///
/// The process runner calls [`SolverMonitor::on_line`] once per output line,
/// in emission order.
pub struct SolverMonitor {
    parser: LineParser,
    store: SharedSeriesStore,
    lines_seen: u64,
}

impl SolverMonitor {
    pub fn new() -> Self {
        Self::with_store(SharedSeriesStore::new())
    }

    /// Monitor feeding an existing store handle
    pub fn with_store(store: SharedSeriesStore) -> Self {
        Self {
            parser: LineParser::new(),
            store,
            lines_seen: 0,
        }
    }

    /// Handle one output line, returning the events it produced
    pub fn on_line(&mut self, line: &str, sink: &mut dyn DisplaySink) -> Vec<SolverEvent> {
        self.lines_seen += 1;
        sink.output(line);

        let events = self.parser.parse(line);
        for event in &events {
            if let SolverEvent::Profiling(text) = event {
                sink.profiling(text);
            }
        }
        if !events.iter().any(SolverEvent::is_series_update) {
            return events;
        }

        let mut store = self.store.lock();
        for event in &events {
            match event {
                SolverEvent::Time(t) => store.record_time(*t),
                SolverEvent::Residual { field, value } => store.record_residual(field, *value),
                SolverEvent::Diagnostic(value) => store.record_diagnostic(*value),
                SolverEvent::Profiling(_) => {}
            }
        }
        events
    }

    /// Handle to the underlying store
    pub fn store(&self) -> &SharedSeriesStore {
        &self.store
    }

    /// Number of lines handled since the last reset
    pub fn lines_seen(&self) -> u64 {
        self.lines_seen
    }

    /// Clear recorded series before a new run
    pub fn reset(&mut self) {
        self.store.reset();
        self.lines_seen = 0;
    }
}

impl Default for SolverMonitor {
    fn default() -> Self {
        Self::new()
    }
}
