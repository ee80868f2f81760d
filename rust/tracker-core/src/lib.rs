// rust/tracker-core/src/lib.rs

//! DMLC Tracker - Core Library
//!
//! This crate starts and supervises the rendezvous tracker of a distributed
//! training job, including configuration, the tracker handshake, log relay,
//! and the embedded-resource and platform helpers used to locate tracker
//! artifacts.

pub mod config;
pub mod error;

// Re-export commonly used types for convenience
pub use config::{TrackerConfig, DEFAULT_FAILURE_GRACE};
pub use error::{Result, TrackerError};

pub mod tracker;
pub use tracker::{Tracker, TrackerExit, TrackerState, TrackerStatus, WorkerEnv};

pub mod platform;
pub use platform::{native_library_resource, Arch, Os, Platform};

pub mod resource;
pub use resource::{EmbeddedResource, ExtractedResource, ResourceBundle};
