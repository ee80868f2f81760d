//! Lifecycle management of the external DMLC tracker process.
//!
//! The tracker is a separate program (usually the Python `tracker.py`) that
//! workers contact to find each other. [`Tracker`] launches it, reads the
//! worker environment from its handshake, relays its logs, and exposes
//! `start` / `wait_for` / `stop` to the job driver.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tracker_core::{Tracker, TrackerConfig};
//!
//! # async fn example() -> tracker_core::Result<()> {
//! let config = TrackerConfig::for_script("python", "/opt/dmlc/tracker.py");
//! let tracker = Tracker::new(4, config)?;
//!
//! if tracker.start(Duration::ZERO).await? {
//!     for (key, value) in tracker.worker_envs().iter() {
//!         println!("{key}={value}");
//!     }
//!     let exit = tracker.wait_for(Duration::ZERO).await?;
//!     println!("tracker finished with {exit}");
//! }
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::handshake::{self, WorkerEnv};
use super::process::ProcessHandle;
use super::relay::LogRelay;
use super::status::{TrackerExit, TrackerState};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::resource::{ExtractedResource, ResourceBundle};

/// Supervisor for one tracker process.
///
/// One instance serves one job: `start` succeeds at most once, and the
/// instance is done once `wait_for` returns or `stop` is called. `stop` and
/// the worker-failure hooks may be called from any thread while another
/// task is blocked in `wait_for`.
pub struct Tracker {
    num_workers: usize,
    config: TrackerConfig,
    started: AtomicBool,
    // Published once by `start`, read by everything else.
    process: OnceLock<Arc<ProcessHandle>>,
    env: OnceLock<WorkerEnv>,
    state: Mutex<TrackerState>,
    // Extracted tracker script; the file is removed when the tracker drops.
    script: Option<ExtractedResource>,
}

impl Tracker {
    /// Create a supervisor for a job with `num_workers` workers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `num_workers` is zero, or a config
    /// error if `config` does not validate.
    pub fn new(num_workers: usize, config: TrackerConfig) -> Result<Self> {
        if num_workers < 1 {
            return Err(TrackerError::invalid_configuration(
                "num_workers must be greater than or equal to one",
            ));
        }
        config.validate()?;

        Ok(Self {
            num_workers,
            config,
            started: AtomicBool::new(false),
            process: OnceLock::new(),
            env: OnceLock::new(),
            state: Mutex::new(TrackerState::NotStarted),
            script: None,
        })
    }

    /// Create a supervisor that runs a tracker script embedded in the binary.
    ///
    /// The script at `path` is extracted to a temporary file that is passed
    /// to `config.program` as its first argument. The file stays on disk for
    /// as long as the returned tracker lives.
    ///
    /// # Errors
    ///
    /// Everything [`new`](Self::new) returns, plus the errors of
    /// [`ResourceBundle::extract`].
    pub fn with_embedded_script(
        num_workers: usize,
        mut config: TrackerConfig,
        bundle: &ResourceBundle,
        path: &str,
    ) -> Result<Self> {
        let script = bundle.extract(path)?;
        config
            .args
            .insert(0, script.path().to_string_lossy().into_owned());

        let mut tracker = Self::new(num_workers, config)?;
        tracker.script = Some(script);
        Ok(tracker)
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Location of the extracted tracker script, if one was embedded.
    pub fn script(&self) -> Option<&Path> {
        self.script.as_ref().map(ExtractedResource::path)
    }

    /// OS process id of the tracker, once spawned.
    pub fn pid(&self) -> Option<u32> {
        self.process.get().and_then(|p| p.pid())
    }

    pub fn state(&self) -> TrackerState {
        let mut state = lock(&self.state);
        if *state == TrackerState::Running
            && self.process.get().is_some_and(|p| p.has_exited())
        {
            *state = TrackerState::Stopped;
        }
        *state
    }

    /// Full command line used to launch the tracker.
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.config.args.len() + 4);
        argv.push(self.config.program.clone());
        argv.extend(self.config.args.iter().cloned());
        argv.push(format!("--log-level={}", self.config.log_level));
        argv.push(format!("--num-workers={}", self.num_workers));
        if let Some(host_ip) = self.config.host_ip() {
            tracing::debug!(host_ip, "using provided tracker host ip");
            argv.push(format!("--host-ip={host_ip}"));
        }
        argv
    }

    /// Environment workers need to connect to the tracker.
    ///
    /// Empty until `start` has returned successfully.
    pub fn worker_envs(&self) -> WorkerEnv {
        self.env.get().cloned().unwrap_or_default()
    }

    /// Launch the tracker and read its handshake.
    ///
    /// The timeout is advisory only: the tracker waits for every worker to
    /// connect, however long that takes, unless it is stopped.
    ///
    /// Returns `Ok(false)` if the process could not be spawned. A handshake
    /// failure is returned as an error and leaves the process running with
    /// its output still relayed; call `stop` to get rid of it.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` on a second call, `Protocol` or `Io` when the
    /// handshake cannot be read.
    pub async fn start(&self, timeout: Duration) -> Result<bool> {
        if !timeout.is_zero() {
            tracing::warn!(
                ?timeout,
                "tracker does not support a start timeout; it waits for all workers to \
                 connect indefinitely unless it is stopped"
            );
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(TrackerError::AlreadyStarted);
        }

        let argv = self.command_line();
        tracing::info!(command = ?argv, num_workers = self.num_workers, "starting tracker");

        let mut child = match Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let err = TrackerError::spawn(&self.config.program, e);
                tracing::error!(error = %err, "FAULT: failed to start tracker process");
                self.set_state(TrackerState::Failed);
                self.stop();
                return Ok(false);
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let process = Arc::new(ProcessHandle::manage(child));
        let pid = process.pid();
        // `started` guarantees this is the only publish.
        let _ = self.process.set(process.clone());
        tracing::debug!(?pid, "tracker process spawned");

        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            self.set_state(TrackerState::Failed);
            return Err(TrackerError::io(
                "spawn",
                std::io::Error::other("tracker stdio was not captured"),
            ));
        };

        let mut stdout = BufReader::new(stdout);
        let handshake = handshake::read_worker_env(&mut stdout).await;

        // The relay owns both pipes from here on, whatever the handshake
        // outcome, so the tracker never writes into a closed pipe.
        LogRelay::new(process, BufReader::new(stderr))
            .with_stdout(stdout)
            .spawn();

        let env = match handshake {
            Ok(env) => env,
            Err(e) => {
                tracing::error!(?pid, error = %e, "cannot get runtime configuration from tracker process");
                self.set_state(TrackerState::Failed);
                return Err(e);
            }
        };

        tracing::info!(?pid, env = %env, "Tracker started, with env={env}");
        let _ = self.env.set(env);
        self.set_state(TrackerState::Running);

        Ok(true)
    }

    /// Forcibly terminate the tracker.
    ///
    /// No-op before a process exists. Safe to call repeatedly and from any
    /// thread, including while another task is in `wait_for`.
    pub fn stop(&self) {
        if let Some(process) = self.process.get() {
            if process.kill() {
                tracing::debug!(pid = ?process.pid(), "sent kill to tracker process");
            }
        }
        let mut state = lock(&self.state);
        if *state == TrackerState::Running {
            *state = TrackerState::Stopped;
        }
    }

    /// Block until the tracker process exits and return how it ended.
    ///
    /// The timeout is advisory only and never shortens the wait.
    ///
    /// # Errors
    ///
    /// `NotStarted` if no tracker process was ever spawned.
    pub async fn wait_for(&self, timeout: Duration) -> Result<TrackerExit> {
        self.wait_for_cancellable(timeout, &CancellationToken::new()).await
    }

    /// Like [`wait_for`](Self::wait_for), but returns
    /// [`TrackerExit::Interrupted`] as soon as `cancel` fires.
    ///
    /// Interruption leaves the tracker running; the caller decides whether
    /// to `stop` it.
    pub async fn wait_for_cancellable(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TrackerExit> {
        if !timeout.is_zero() {
            tracing::warn!(
                ?timeout,
                "tracker does not support a wait timeout; it waits for all workers to finish \
                 and send the shutdown signal, or for a manual interruption"
            );
        }
        let process = self.process.get().ok_or(TrackerError::NotStarted)?.clone();

        let status = tokio::select! {
            status = process.wait() => status,
            _ = cancel.cancelled() => {
                tracing::warn!(pid = ?process.pid(), "wait for the tracker was interrupted");
                return Ok(TrackerExit::Interrupted);
            }
        };

        let Some(status) = status else {
            tracing::error!(pid = ?process.pid(), "the tracker wait was terminated unexpectedly");
            return Ok(TrackerExit::Interrupted);
        };

        let exit = TrackerExit::from_status(status);
        tracing::info!(pid = ?process.pid(), %exit, "Tracker process ends with {exit}");
        self.stop();
        Ok(exit)
    }

    /// Handle a failure on a worker thread.
    ///
    /// Logs the failure, sleeps for the configured grace period so the
    /// tracker can flush its output, then terminates the tracker. This
    /// blocks the calling thread; call it from worker threads, not from
    /// async tasks.
    pub fn report_worker_failure(&self, worker: &str, reason: &dyn fmt::Display) {
        tracing::error!(worker, %reason, "Uncaught exception thrown by worker: {reason}");
        thread::sleep(self.config.failure_grace());
        self.stop();
    }

    /// Run `f` on a named worker thread; a panic in `f` stops the tracker.
    ///
    /// The handle yields `None` if `f` panicked.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to create the thread.
    pub fn supervise_worker<F, T>(
        self: &Arc<Self>,
        name: impl Into<String>,
        f: F,
    ) -> std::io::Result<JoinHandle<Option<T>>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let name = name.into();
        let tracker = Arc::clone(self);
        thread::Builder::new().name(name.clone()).spawn(move || {
            match std::panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => Some(value),
                Err(payload) => {
                    tracker.report_worker_failure(&name, &panic_message(payload.as_ref()));
                    None
                }
            }
        })
    }

    fn set_state(&self, next: TrackerState) {
        let mut state = lock(&self.state);
        if !state.is_terminal() {
            *state = next;
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("num_workers", &self.num_workers)
            .field("pid", &self.pid())
            .field("state", &self.state())
            .field("script", &self.script())
            .finish()
    }
}

fn lock(state: &Mutex<TrackerState>) -> std::sync::MutexGuard<'_, TrackerState> {
    // The guarded value is a plain enum, so a poisoned lock is still usable.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
