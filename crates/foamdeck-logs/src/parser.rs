use regex::Regex;

use foamdeck_types::SolverEvent;

/// Decimal float with optional sign and exponent
const NUMBER: &str = r"[-+]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][-+]?[0-9]+)?";

/// Line parser for extracting solver events from raw OpenFOAM output
///
/// Patterns are compiled once; `parse` holds no state between calls.
#[derive(Clone, Debug)]
pub struct LineParser {
    time: Regex,
    residual: Regex,
    diagnostic: Regex,
}

impl LineParser {
    pub fn new() -> Self {
        Self {
            // `\b` keeps `ExecutionTime = ...` and `ClockTime = ...` out
            time: compile(&format!(r"\bTime = ({NUMBER})")),
            residual: compile(&format!(
                r"smoothSolver:  Solving for ([a-zA-Z0-9_.]+), Initial residual = ({NUMBER})"
            )),
            diagnostic: compile(&format!(r"Max cell volume fraction\s*=\s*({NUMBER})")),
        }
    }

    /// Parse a raw output line into zero or more events
    pub fn parse(&self, line: &str) -> Vec<SolverEvent> {
        let mut events = Vec::new();

        if line.contains("ExecutionTime") || line.contains("ClockTime") {
            events.push(SolverEvent::Profiling(line.to_string()));
        }

        if let Some(iterations) = Self::iteration_count(line) {
            events.push(SolverEvent::Profiling(format!(
                "Solver performance: {} iterations",
                iterations
            )));
        }

        if let Some(time) = capture_number(&self.time, line, 1) {
            events.push(SolverEvent::Time(time));
        }

        if let Some(caps) = self.residual.captures(line) {
            if let Ok(value) = caps[2].parse::<f64>() {
                events.push(SolverEvent::Residual {
                    field: caps[1].to_string(),
                    value,
                });
            }
        }

        if let Some(value) = capture_number(&self.diagnostic, line, 1) {
            events.push(SolverEvent::Diagnostic(value));
        }

        events
    }

    /// Extract the iteration count from a linear-solver summary line
    ///
    /// Only the third comma-separated field is inspected.
    fn iteration_count(line: &str) -> Option<&str> {
        let is_solver_line = (line.contains("smoothSolver:") || line.contains("GAMG:"))
            && line.contains("Solving for");
        if !is_solver_line || !line.contains("Final residual") || !line.contains("No Iterations") {
            return None;
        }

        let field = line.split(',').nth(2)?.trim();
        if !field.contains("No Iterations") {
            return None;
        }
        field.split_whitespace().last()
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in solver pattern must compile")
}

/// Parse capture group `group` as f64, dropping the match if conversion fails
fn capture_number(re: &Regex, line: &str, group: usize) -> Option<f64> {
    re.captures(line)?.get(group)?.as_str().parse().ok()
}
