// rust/tracker-core/src/config.rs

//! Configuration for launching the DMLC tracker.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TrackerError};

/// Time given to in-flight tracker output to flush after a worker failure,
/// before the tracker is forcibly terminated.
pub const DEFAULT_FAILURE_GRACE: Duration = Duration::from_secs(5);

/// Verbosity passed to the tracker through `--log-level`.
pub const DEFAULT_TRACKER_LOG_LEVEL: &str = "DEBUG";

/// Tracker launch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Program that runs the tracker, e.g. a Python interpreter.
    pub program: String,
    /// Arguments placed before the tracker flags (usually the tracker script path).
    pub args: Vec<String>,
    /// Value of the `--log-level` flag.
    pub log_level: String,
    // Address the tracker should bind to. Empty means "let the tracker pick".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    // Grace period (milliseconds) between a worker failure and tracker termination.
    pub failure_grace_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: Vec::new(),
            log_level: DEFAULT_TRACKER_LOG_LEVEL.to_string(),
            host_ip: None,
            failure_grace_ms: DEFAULT_FAILURE_GRACE.as_millis() as u64,
        }
    }
}

impl FromStr for TrackerConfig {
    type Err = TrackerError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| TrackerError::config_with_source("failed to parse TOML config", e))
    }
}

impl TrackerConfig {
    /// Configuration that runs `script` with the given interpreter.
    pub fn for_script(program: impl Into<String>, script: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: vec![script.as_ref().to_string_lossy().into_owned()],
            ..Default::default()
        }
    }

    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrackerError::config_with_source(
                format!("failed to read config file '{}'", path.display()),
                e,
            )
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `DMLC_TRACKER_`:
    // - `DMLC_TRACKER_PROGRAM` overrides `program`
    // - `DMLC_TRACKER_LOG_LEVEL` overrides `log_level`
    // - `DMLC_TRACKER_HOST_IP` overrides `host_ip`
    // - `DMLC_TRACKER_FAILURE_GRACE_MS` overrides `failure_grace_ms`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("DMLC_TRACKER_PROGRAM") {
            if !val.is_empty() {
                self.program = val;
            }
        }
        if let Ok(val) = std::env::var("DMLC_TRACKER_LOG_LEVEL") {
            if !val.is_empty() {
                self.log_level = val;
            }
        }
        if let Ok(val) = std::env::var("DMLC_TRACKER_HOST_IP") {
            self.host_ip = Some(val);
        }
        if let Ok(val) = std::env::var("DMLC_TRACKER_FAILURE_GRACE_MS") {
            if let Ok(v) = val.parse() {
                self.failure_grace_ms = v;
            }
        }
        self
    }

    /// The host-ip override, treating an empty value as absent.
    pub fn host_ip(&self) -> Option<&str> {
        self.host_ip.as_deref().filter(|ip| !ip.is_empty())
    }

    pub fn failure_grace(&self) -> Duration {
        Duration::from_millis(self.failure_grace_ms)
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(TrackerError::config("program must not be empty"));
        }
        if self.log_level.trim().is_empty() {
            return Err(TrackerError::config("log_level must not be empty"));
        }
        if self.args.is_empty() && is_python(&self.program) {
            return Err(TrackerError::config(format!(
                "program '{}' needs the tracker script as its first argument",
                self.program
            )));
        }
        Ok(())
    }
}

fn is_python(program: &str) -> bool {
    Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("python"))
}
