//! Solver process management
//!
//! Spawns OpenFOAM through a login shell, streams its output through a
//! [`SolverMonitor`] and records the run in the history.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use foamdeck_history::{NewRun, RunHistory, RunRecord, RunStatus};
use foamdeck_logs::{DisplaySink, OutputLine, OutputStreamManager, SeriesStore, SolverMonitor, StreamKind};

use crate::case::CaseDir;

/// How often a progress line is logged while the solver runs
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Time a stopped process group gets between SIGTERM and SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Exit code after a second Ctrl-C, as for a shell killed by SIGINT
const SIGINT_EXIT_CODE: i32 = 130;

/// OpenFOAM installation used to build shell commands
#[derive(Debug, Clone)]
pub struct FoamEnv {
    pub install_root: PathBuf,
    pub version: String,
}

impl FoamEnv {
    /// `source <root>/<version>/etc/bashrc && <command>`
    pub fn script(&self, command: &str) -> String {
        format!(
            "source {}/{}/etc/bashrc && {command}",
            self.install_root.display(),
            self.version
        )
    }

    /// Login shell running `command` inside `case_dir`
    pub fn command(&self, case_dir: &Path, command: &str) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg("-l")
            .arg("-c")
            .arg(self.script(command))
            .current_dir(case_dir);
        cmd
    }
}

/// Solver invocation, parallel through MPI unless `ranks` is 1
pub fn solver_invocation(solver: &str, ranks: u32) -> String {
    if ranks <= 1 {
        solver.to_string()
    } else {
        format!("mpirun -np {ranks} {solver} -parallel")
    }
}

/// Mesh quality report for the case's polyMesh
pub const CHECK_MESH: &str = "checkMesh";

/// Import an I-DEAS UNV mesh into the case
pub fn convert_mesh_invocation(unv: &Path) -> String {
    format!("ideasUnvToFoam {}", shell_quote(&unv.display().to_string()))
}

fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub solver: String,
    pub ranks: u32,
    pub notes: String,
    /// Write the residual table here when the run ends
    pub csv: Option<PathBuf>,
}

/// Result of driving one process to completion
#[derive(Debug)]
pub struct ProcessOutcome {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub lines: u64,
    pub dropped_lines: u64,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub process: ProcessOutcome,
    pub record: RunRecord,
    pub series: SeriesStore,
}

/// Run a solver on `case`, then record it in `history`
pub async fn run_solver(
    env: &FoamEnv,
    case: &CaseDir,
    options: &RunOptions,
    history: &RunHistory,
    sink: &mut dyn DisplaySink,
) -> Result<RunOutcome> {
    let invocation = solver_invocation(&options.solver, options.ranks);
    tracing::info!(
        solver = %options.solver,
        ranks = options.ranks,
        case = %case.path().display(),
        "starting simulation"
    );
    sink.output(&format!("Command: {}", env.script(&invocation)));

    let mut monitor = SolverMonitor::new();
    let stop = CtrlCStop::listen();
    let command = env.command(case.path(), &invocation);
    let process = drive(command, &mut monitor, sink, stop.token()).await;
    stop.release();
    let process = process?;

    let series = monitor.store().snapshot();
    if let Some(path) = &options.csv {
        export_series(&series, path)?;
    }

    let record = history
        .add_entry(NewRun {
            solver: options.solver.clone(),
            case_path: case.path().display().to_string(),
            start_time: process.start_time,
            end_time: process.end_time,
            status: process.status,
            notes: options.notes.clone(),
        })
        .context("recording run in history")?;

    Ok(RunOutcome {
        process,
        record,
        series,
    })
}

/// Run an OpenFOAM utility such as `decomposePar` in `case`
pub async fn run_utility(
    env: &FoamEnv,
    case: &CaseDir,
    utility: &str,
    sink: &mut dyn DisplaySink,
) -> Result<ProcessOutcome> {
    tracing::info!(utility, case = %case.path().display(), "starting utility");
    let mut monitor = SolverMonitor::new();
    let stop = CtrlCStop::listen();
    let command = env.command(case.path(), utility);
    let outcome = drive(command, &mut monitor, sink, stop.token()).await;
    stop.release();
    outcome
}

/// Ctrl-C listener that stops a running process
///
/// The first Ctrl-C cancels [`CtrlCStop::token`]. Once the token is cancelled,
/// or the listener released after the process ended, Ctrl-C exits foamdeck
/// with status 130, since tokio never restores the default SIGINT action.
/// Dropping the guard removes the listener.
pub struct CtrlCStop {
    token: CancellationToken,
    listener: Option<JoinHandle<()>>,
}

impl CtrlCStop {
    pub fn listen() -> Self {
        let token = CancellationToken::new();
        let stop = token.clone();
        let listener = tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                    return;
                }
                if stop.is_cancelled() {
                    tracing::warn!("interrupted");
                    std::process::exit(SIGINT_EXIT_CODE);
                }
                stop.cancel();
            }
        });
        Self {
            token,
            listener: Some(listener),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Stop owning the process; later Ctrl-C presses exit foamdeck
    pub fn release(&self) {
        self.token.cancel();
    }
}

impl Drop for CtrlCStop {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

/// Spawn `command` and feed its output through `monitor` until it exits
///
/// The process leads its own process group. Cancelling `stop` terminates the
/// whole group, so MPI launchers and their ranks go down with the shell; the
/// run then counts as interrupted whatever its exit code.
pub async fn drive(
    mut command: Command,
    monitor: &mut SolverMonitor,
    sink: &mut dyn DisplaySink,
    stop: &CancellationToken,
) -> Result<ProcessOutcome> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let start_time = now();
    let mut child = command.spawn().context("failed to start process")?;
    let group = child.id().and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw);

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<OutputLine>();
    let mut streams = OutputStreamManager::new();
    if let Some(stdout) = child.stdout.take() {
        streams.attach(stdout, StreamKind::Stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        streams.attach(stderr, StreamKind::Stderr, line_tx.clone());
    }
    // Channel closes once both readers hit EOF
    drop(line_tx);

    let mut progress = tokio::time::interval(PROGRESS_INTERVAL);
    progress.tick().await;
    let mut interrupted = false;

    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                forward(line, monitor, sink);
            }

            _ = stop.cancelled() => {
                interrupted = true;
                sink.output("Stopping simulation...");
                break;
            }

            _ = progress.tick() => {
                if let Some(summary) = progress_summary(&monitor.store().lock()) {
                    tracing::info!("{summary}");
                }
            }
        }
    }

    let exit = match (interrupted, group) {
        (true, Some(group)) => terminate_group(&mut child, group).await?,
        _ => child.wait().await.context("waiting for process")?,
    };
    while let Ok(line) = line_rx.try_recv() {
        forward(line, monitor, sink);
    }
    let dropped_lines = streams.dropped_lines();
    streams.stop();

    let status = if interrupted {
        RunStatus::Interrupted
    } else {
        RunStatus::from_exit_code(exit.code())
    };
    match exit.code() {
        Some(0) => sink.output("Simulation finished successfully."),
        Some(code) => sink.output(&format!("Simulation finished with exit code {code}.")),
        None => sink.output("Simulation terminated by signal."),
    }
    if dropped_lines > 0 {
        tracing::warn!(dropped_lines, "output lines were not valid UTF-8");
    }

    Ok(ProcessOutcome {
        status,
        exit_code: exit.code(),
        start_time,
        end_time: now(),
        lines: monitor.lines_seen(),
        dropped_lines,
    })
}

/// SIGTERM the group, then SIGKILL whatever outlives [`STOP_GRACE`]
async fn terminate_group(child: &mut Child, group: Pid) -> Result<ExitStatus> {
    tracing::info!(pgid = group.as_raw(), "terminating process group");
    signal_group(group, Signal::SIGTERM);

    let deadline = Instant::now() + STOP_GRACE;
    let exit = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(exit) => Some(exit.context("waiting for process")?),
        Err(_) => None,
    };
    while group_alive(group) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if group_alive(group) {
        tracing::warn!(pgid = group.as_raw(), "process group ignored SIGTERM, killing");
        signal_group(group, Signal::SIGKILL);
    }

    match exit {
        Some(exit) => Ok(exit),
        None => child.wait().await.context("waiting for process"),
    }
}

fn signal_group(group: Pid, signal: Signal) {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            tracing::warn!(error = %e, signal = signal.as_str(), "failed to signal process group")
        }
    }
}

fn group_alive(group: Pid) -> bool {
    !matches!(killpg(group, None::<Signal>), Err(Errno::ESRCH))
}

/// Feed an existing log through `monitor`
pub async fn replay<R>(reader: R, monitor: &mut SolverMonitor, sink: &mut dyn DisplaySink) -> u64
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let mut streams = OutputStreamManager::new();
    streams.attach(reader, StreamKind::Stdout, line_tx);

    while let Some(line) = line_rx.recv().await {
        forward(line, monitor, sink);
    }
    streams.dropped_lines()
}

fn forward(line: OutputLine, monitor: &mut SolverMonitor, sink: &mut dyn DisplaySink) {
    match line.kind {
        StreamKind::Stdout => {
            monitor.on_line(&line.text, sink);
        }
        StreamKind::Stderr => sink.output(&format!("Error: {}", line.text)),
    }
}

/// Latest time and residuals, e.g. `t = 0.5  Ux 1.2e-3  p 4e-2`
pub fn progress_summary(store: &SeriesStore) -> Option<String> {
    let time = store.times().last()?;
    let mut summary = format!("t = {time}");
    for series in store.series() {
        if let Some(Some(value)) = series.values.last() {
            summary.push_str(&format!("  {} {value:e}", series.name));
        }
    }
    Some(summary)
}

pub fn export_series(store: &SeriesStore, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    store
        .export_csv(BufWriter::new(file))
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = store.times().len(), "residuals exported");
    Ok(())
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
