use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Which pipe of the child process a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One decoded line of process output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub kind: StreamKind,
    pub text: String,
}

/// Manages reader tasks forwarding process output as lines
pub struct OutputStreamManager {
    /// Cancellation token for stopping readers
    cancel: CancellationToken,

    /// Active reader task handles
    tasks: Vec<tokio::task::JoinHandle<()>>,

    /// Lines dropped because they were not valid UTF-8
    dropped: Arc<AtomicU64>,
}

impl OutputStreamManager {
    /// Create a new stream manager
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start forwarding lines from `reader`
    ///
    /// Lines of one reader are sent in the order they were written.
    pub fn attach<R>(&mut self, reader: R, kind: StreamKind, line_tx: mpsc::UnboundedSender<OutputLine>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let dropped = Arc::clone(&self.dropped);

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();

            loop {
                buf.clear();
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    result = reader.read_until(b'\n', &mut buf) => {
                        match result {
                            Ok(0) => {
                                // EOF, process closed the pipe
                                break;
                            }
                            Ok(_) => {
                                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                                    buf.pop();
                                }
                                let text = match String::from_utf8(std::mem::take(&mut buf)) {
                                    Ok(text) => text,
                                    Err(_) => {
                                        dropped.fetch_add(1, Ordering::Relaxed);
                                        tracing::debug!(?kind, "dropping non UTF-8 output line");
                                        continue;
                                    }
                                };

                                if line_tx.send(OutputLine { kind, text }).is_err() {
                                    // Receiver gone, stop reading
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(?kind, error = %e, "output stream read failed");
                                break;
                            }
                        }
                    }
                }
            }
        });
        self.tasks.push(task);
    }

    /// Stop all readers
    pub fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        // Fresh token so the manager can be reused for the next run
        self.cancel = CancellationToken::new();
    }

    /// Number of lines dropped for invalid encoding
    pub fn dropped_lines(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for OutputStreamManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OutputStreamManager {
    fn drop(&mut self) {
        self.stop();
    }
}
