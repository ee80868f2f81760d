//! DMLC Tracker Launcher
//!
//! This binary starts the rendezvous tracker for a distributed training job,
//! prints the environment workers need to reach it, and waits for the job
//! to finish.
//!
//! # Usage
//!
//! ```bash
//! # Start a tracker for 4 workers using a tracker script
//! dmlc-tracker --num-workers 4 --script /opt/dmlc/tracker.py
//!
//! # Bind the tracker to a specific address
//! dmlc-tracker --num-workers 4 --script tracker.py --host-ip 10.0.0.7
//!
//! # Start with configuration file
//! dmlc-tracker --num-workers 4 --config tracker.toml
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_core::{Tracker, TrackerConfig, TrackerExit, TrackerStatus};

/// DMLC rendezvous tracker launcher
#[derive(Parser, Debug)]
#[command(name = "dmlc-tracker")]
#[command(about = "Start a DMLC tracker and hand its environment to workers")]
struct Args {
    /// Number of workers that will connect to the tracker
    #[arg(short = 'n', long)]
    num_workers: usize,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tracker script, run with the configured program (required for python
    /// unless the config file lists it in `args`)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Program that runs the tracker (overrides config)
    #[arg(long)]
    program: Option<String>,

    /// Address the tracker binds to (overrides config)
    #[arg(long)]
    host_ip: Option<String>,

    /// Seconds to wait for the tracker; advisory only, the wait is unbounded
    #[arg(long, default_value = "0")]
    wait_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn tracker_config(&self) -> tracker_core::Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::from_file(path)?,
            None => TrackerConfig::default(),
        }
        .with_env_overrides();

        if let Some(program) = &self.program {
            config.program = program.clone();
        }
        if let Some(script) = &self.script {
            config.args = vec![script.to_string_lossy().into_owned()];
        }
        if let Some(host_ip) = &self.host_ip {
            config.host_ip = Some(host_ip.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args).await {
        Ok(exit) => ExitCode::from(exit_code(exit)),
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(TrackerStatus::Failure.code() as u8)
        }
    }
}

async fn run(args: Args) -> tracker_core::Result<TrackerExit> {
    let config = args.tracker_config()?;
    let tracker = Tracker::new(args.num_workers, config)?;
    let timeout = Duration::from_secs(args.wait_timeout);

    tracing::info!("Starting DMLC tracker");
    tracing::info!("  Workers: {}", tracker.num_workers());
    tracing::info!("  Command: {}", tracker.command_line().join(" "));

    match tracker.start(timeout).await {
        Ok(true) => {}
        Ok(false) => return Ok(TrackerExit::Code(TrackerStatus::Failure.code())),
        Err(e) => {
            tracker.stop();
            return Err(e);
        }
    }

    // stdout carries the worker environment, one KEY=VALUE per line.
    for (key, value) in tracker.worker_envs().iter() {
        println!("{key}={value}");
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down tracker...");
            ctrl_c.cancel();
        }
    });

    let exit = tracker.wait_for_cancellable(timeout, &cancel).await?;
    if exit == TrackerExit::Interrupted {
        tracker.stop();
    }
    Ok(exit)
}

// Codes a shell cannot represent are reported as a failure, never as success.
fn exit_code(exit: TrackerExit) -> u8 {
    let failure = TrackerStatus::Failure.code() as u8;
    match exit {
        TrackerExit::Code(code) => u8::try_from(code).unwrap_or(failure),
        TrackerExit::Signal(signal) => u8::try_from(128 + signal).unwrap_or(failure),
        TrackerExit::Interrupted => TrackerStatus::Interrupted.code() as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = Args::parse_from([
            "dmlc-tracker",
            "--num-workers",
            "3",
            "--script",
            "/opt/tracker.py",
            "--program",
            "python3",
            "--host-ip",
            "10.0.0.9",
        ]);
        let config = args.tracker_config().unwrap();

        assert_eq!(args.num_workers, 3);
        assert_eq!(config.program, "python3");
        assert_eq!(config.args, vec!["/opt/tracker.py".to_string()]);
        assert_eq!(config.host_ip(), Some("10.0.0.9"));
    }

    #[test]
    fn test_num_workers_required() {
        assert!(Args::try_parse_from(["dmlc-tracker"]).is_err());
    }

    #[test]
    fn test_unrepresentable_exit_code_is_failure() {
        assert_eq!(exit_code(TrackerExit::Code(-1)), 3);
        assert_eq!(exit_code(TrackerExit::Code(256)), 3);
        // Windows NTSTATUS crash code (STATUS_ACCESS_VIOLATION).
        assert_eq!(exit_code(TrackerExit::Code(0xC000_0005_u32 as i32)), 3);
    }

    #[test]
    fn test_missing_script_is_rejected() {
        let args = Args::parse_from(["dmlc-tracker", "--num-workers", "2", "--program", "python3"]);
        assert!(args.tracker_config().is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(TrackerExit::Code(0)), 0);
        assert_eq!(exit_code(TrackerExit::Code(7)), 7);
        assert_eq!(exit_code(TrackerExit::Code(255)), 255);
        assert_eq!(exit_code(TrackerExit::Signal(9)), 137);
        assert_eq!(exit_code(TrackerExit::Signal(200)), 3);
        assert_eq!(exit_code(TrackerExit::Interrupted), 1);
    }
}
