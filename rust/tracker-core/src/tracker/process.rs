//! Shared handle to the spawned tracker process.
//!
//! `tokio::process::Child` needs `&mut` access both to wait and to kill, so
//! the child is moved into a reaper task instead of being shared. Kill
//! requests reach the reaper over a channel and the final exit status is
//! published through a `watch` channel that any number of waiters can read.

use std::process::ExitStatus;

use tokio::process::Child;
use tokio::sync::{mpsc, watch};

pub struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: mpsc::UnboundedSender<()>,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
}

impl ProcessHandle {
    /// Take ownership of `child` and reap it on a background task.
    ///
    /// Must be called from within a tokio runtime. The child's stdio handles
    /// should be taken before calling this.
    pub fn manage(mut child: Child) -> Self {
        let pid = child.id();
        let (kill_tx, mut kill_rx) = mpsc::unbounded_channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Some(()) = kill_rx.recv() => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(?pid, error = %e, "failed to kill tracker process");
                    }
                    child.wait().await
                }
            };

            match status {
                Ok(status) => {
                    exit_tx.send_replace(Some(status));
                }
                // Dropping exit_tx without a value tells waiters the status is lost.
                Err(e) => tracing::error!(?pid, error = %e, "failed to wait for tracker process"),
            }
        });

        Self {
            pid,
            kill_tx,
            exit_rx,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request forcible termination.
    ///
    /// Returns false when the process has already been reaped. Safe to call
    /// any number of times from any thread.
    pub fn kill(&self) -> bool {
        self.kill_tx.send(()).is_ok()
    }

    /// The exit status, if the process has already ended.
    pub fn try_exit_status(&self) -> Option<ExitStatus> {
        *self.exit_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.try_exit_status().is_some()
    }

    /// Wait until the process ends.
    ///
    /// Returns `None` if the reaper went away without observing the exit,
    /// e.g. because the runtime is shutting down.
    pub async fn wait(&self) -> Option<ExitStatus> {
        let mut rx = self.exit_rx.clone();
        let status = rx.wait_for(Option::is_some).await.ok().and_then(|s| *s);
        status
    }
}
