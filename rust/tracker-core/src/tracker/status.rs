//! Lifecycle and exit status types for the tracker process.

use std::fmt;
use std::process::ExitStatus;

/// Lifecycle of a [`Tracker`](super::Tracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerState {
    #[default]
    NotStarted,
    Running,
    Stopped,
    Failed,
}

impl TrackerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// How the tracker process ended, as observed by `wait_for`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerExit {
    /// The process exited with this code.
    Code(i32),
    /// The process was terminated by this signal (unix).
    Signal(i32),
    /// The wait was cancelled before the process ended.
    Interrupted,
}

impl TrackerExit {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        Self::Code(-1)
    }

    pub fn is_success(self) -> bool {
        self == Self::Code(0)
    }

    /// Job-level status for drivers that only report coarse outcomes.
    pub fn status(self) -> TrackerStatus {
        match self {
            Self::Code(0) => TrackerStatus::Success,
            Self::Interrupted => TrackerStatus::Interrupted,
            _ => TrackerStatus::Failure,
        }
    }
}

impl fmt::Display for TrackerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Signal(signal) => write!(f, "signal {signal}"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Coarse status codes reported by a tracker-driven job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TrackerStatus {
    Success = 0,
    Interrupted = 1,
    /// Reserved. Tracker timeouts are advisory, so nothing here reports it,
    /// but drivers that enforce their own deadline use this code.
    Timeout = 2,
    Failure = 3,
}

impl TrackerStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}
