//! Background relay of the tracker's diagnostic output.
//!
//! Once the handshake is done, the relay forwards every line the tracker
//! writes to the `dmlc_tracker` tracing target, then waits for the process
//! to end and reports its exit status. It runs detached: failures are logged
//! here and never reach the thread driving the tracker.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tokio::task::JoinHandle;

use super::process::ProcessHandle;
use super::status::TrackerExit;

/// Tracing target for lines relayed from the tracker process.
pub const RELAY_TARGET: &str = "dmlc_tracker";

/// Longer lines are relayed in pieces of at most this many bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

type LineSource = Box<dyn AsyncBufRead + Unpin + Send>;

/// What the relay observed before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelaySummary {
    pub stderr_lines: u64,
    pub stdout_lines: u64,
    /// `None` when the relay ended before the exit status was known.
    pub exit: Option<TrackerExit>,
}

pub struct LogRelay {
    process: Arc<ProcessHandle>,
    stderr: LineSource,
    stdout: Option<LineSource>,
}

impl LogRelay {
    pub fn new(
        process: Arc<ProcessHandle>,
        stderr: impl AsyncBufRead + Unpin + Send + 'static,
    ) -> Self {
        Self {
            process,
            stderr: Box::new(stderr),
            stdout: None,
        }
    }

    /// Also drain what is left of standard output after the handshake.
    pub fn with_stdout(mut self, stdout: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        self.stdout = Some(Box::new(stdout));
        self
    }

    pub fn spawn(self) -> JoinHandle<RelaySummary> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> RelaySummary {
        let Self {
            process,
            stderr,
            stdout,
        } = self;
        let pid = process.pid();

        let (stderr_result, stdout_lines) = tokio::join!(drain("stderr", stderr), async move {
            match stdout {
                Some(stdout) => drain("stdout", stdout).await.unwrap_or_else(|e| {
                    tracing::warn!(?pid, error = %e, "error reading tracker stdout");
                    0
                }),
                None => 0,
            }
        });

        let mut summary = RelaySummary {
            stdout_lines,
            ..Default::default()
        };
        summary.stderr_lines = match stderr_result {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(?pid, error = %e, "error reading tracker stderr, log relay stopping");
                return summary;
            }
        };

        match process.wait().await {
            Some(status) => {
                let exit = TrackerExit::from_status(status);
                tracing::info!(?pid, %exit, "Tracker process ends with {exit}");
                summary.exit = Some(exit);
            }
            None => {
                tracing::warn!(?pid, "the tracker log relay was terminated unexpectedly");
            }
        }
        summary
    }
}

// Bytes that are not valid UTF-8 are replaced, never treated as an error;
// only a failed read ends the loop before end-of-stream.
async fn drain<R>(stream: &'static str, mut reader: R) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        let n = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(count);
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        tracing::info!(target: RELAY_TARGET, stream, "{line}");
        count += 1;
    }
}
