//! Supervision of the DMLC tracker process.
//!
//! This module launches the external tracker that distributed workers use
//! for rendezvous, including:
//!
//! - Building the tracker command line
//! - Reading the worker environment from the tracker handshake
//! - Relaying tracker logs and reporting its exit status
//! - Start / wait / stop lifecycle and worker failure handling

pub mod handshake;
mod process;
pub mod relay;
pub mod status;
mod supervisor;

// Re-exports
pub use handshake::{read_worker_env, WorkerEnv, ENV_END, ENV_START};
pub use process::ProcessHandle;
pub use relay::{LogRelay, RelaySummary, MAX_LINE_BYTES, RELAY_TARGET};
pub use status::{TrackerExit, TrackerState, TrackerStatus};
pub use supervisor::Tracker;
