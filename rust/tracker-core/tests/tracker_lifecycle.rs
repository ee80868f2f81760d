//! End-to-end lifecycle tests against a fake tracker written in `sh`.
//!
//! The fake tracker receives the real tracker flags as positional
//! parameters: `$1` is `--log-level=..`, `$2` is `--num-workers=N` and `$3`
//! (when configured) is `--host-ip=..`.

#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracker_core::{
    EmbeddedResource, ResourceBundle, Tracker, TrackerConfig, TrackerError, TrackerExit,
    TrackerState,
};

const HANDSHAKE: &str = r#"
echo DMLC_TRACKER_ENV_START
echo DMLC_TRACKER_URI=127.0.0.1
echo DMLC_TRACKER_PORT=9091
echo "DMLC_NUM_WORKER=${2#--num-workers=}"
echo DMLC_TRACKER_ENV_END
echo "tracker listening" >&2
"#;

fn fake_tracker(body: &str) -> TrackerConfig {
    TrackerConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), body.to_string(), "fake-tracker".to_string()],
        failure_grace_ms: 50,
        ..Default::default()
    }
}

fn running_tracker(num_workers: usize) -> Tracker {
    let script = format!("{HANDSHAKE}\nexec sleep 30");
    Tracker::new(num_workers, fake_tracker(&script)).unwrap()
}

fn kill_externally(pid: u32, signal: &str) {
    let status = std::process::Command::new("kill")
        .args([format!("-{signal}"), pid.to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

fn is_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0".to_string(), pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap()
        .success()
}

#[tokio::test]
async fn start_publishes_worker_env() {
    let tracker = running_tracker(2);

    assert!(tracker.start(Duration::ZERO).await.unwrap());
    assert_eq!(tracker.state(), TrackerState::Running);

    let env = tracker.worker_envs();
    assert_eq!(env.len(), 3);
    assert_eq!(env.get("DMLC_TRACKER_URI"), Some("127.0.0.1"));
    assert_eq!(env.get("DMLC_TRACKER_PORT"), Some("9091"));
    assert_eq!(env.get("DMLC_NUM_WORKER"), Some("2"));

    tracker.stop();
    tracker.wait_for(Duration::ZERO).await.unwrap();
}

#[tokio::test]
async fn external_termination_is_reported() {
    let tracker = running_tracker(2);
    assert!(tracker.start(Duration::ZERO).await.unwrap());
    let env_before = tracker.worker_envs();
    assert!(!env_before.is_empty());

    kill_externally(tracker.pid().unwrap(), "TERM");

    let exit = tracker.wait_for(Duration::ZERO).await.unwrap();
    assert_eq!(exit, TrackerExit::Signal(15));
    assert_eq!(tracker.worker_envs(), env_before);
    assert_eq!(tracker.state(), TrackerState::Stopped);
}

#[tokio::test]
async fn wait_returns_real_exit_code() {
    let script = format!("{HANDSHAKE}\nsleep 0.2\nexit 4");
    let tracker = Tracker::new(1, fake_tracker(&script)).unwrap();
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    let exit = tracker.wait_for(Duration::ZERO).await.unwrap();
    assert_eq!(exit, TrackerExit::Code(4));
    assert_eq!(tracker.state(), TrackerState::Stopped);
}

#[tokio::test]
async fn advisory_timeout_does_not_shorten_wait() {
    let script = format!("{HANDSHAKE}\nsleep 0.4\nexit 0");
    let tracker = Tracker::new(1, fake_tracker(&script)).unwrap();
    assert!(tracker.start(Duration::from_millis(10)).await.unwrap());

    let started = Instant::now();
    let exit = tracker.wait_for(Duration::from_millis(10)).await.unwrap();

    assert_eq!(exit, TrackerExit::Code(0));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn stop_twice_terminates_once() {
    let tracker = running_tracker(2);
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    tracker.stop();
    tracker.stop();
    assert_eq!(tracker.state(), TrackerState::Stopped);

    let exit = tracker.wait_for(Duration::ZERO).await.unwrap();
    assert_eq!(exit, TrackerExit::Signal(9));

    tracker.stop();
    assert_eq!(tracker.wait_for(Duration::ZERO).await.unwrap(), exit);
}

#[tokio::test]
async fn stop_from_another_thread_releases_waiter() {
    let tracker = Arc::new(running_tracker(2));
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    let stopper = tracker.clone();
    let thread = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        stopper.stop();
    });

    let exit = tracker.wait_for(Duration::ZERO).await.unwrap();
    thread.join().unwrap();
    assert_eq!(exit, TrackerExit::Signal(9));
}

#[tokio::test]
async fn invalid_utf8_output_keeps_tracker_alive() {
    let script = format!(
        r#"{HANDSHAKE}
printf 'bad \377\n' >&2
printf 'stdout \376\n'
sleep 0.3
i=0
while [ $i -lt 2000 ]; do echo "line $i" >&2; i=$((i+1)); done
exit 0"#
    );
    let tracker = Tracker::new(1, fake_tracker(&script)).unwrap();
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    assert_eq!(
        tracker.wait_for(Duration::ZERO).await.unwrap(),
        TrackerExit::Code(0)
    );
}

#[tokio::test]
async fn handshake_failure_leaves_process_running() {
    let script = r#"
echo hello
sleep 0.2
i=0
while [ $i -lt 500 ]; do echo "out $i"; echo "err $i" >&2; i=$((i+1)); done
exec sleep 30"#;
    let tracker = Tracker::new(2, fake_tracker(script)).unwrap();

    let err = tracker.start(Duration::ZERO).await.unwrap_err();
    assert!(err.is_protocol());
    assert_eq!(tracker.state(), TrackerState::Failed);
    assert!(tracker.worker_envs().is_empty());
    let pid = tracker.pid().unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(is_alive(pid));

    tracker.stop();
    assert_eq!(tracker.state(), TrackerState::Failed);
    assert_eq!(
        tracker.wait_for(Duration::ZERO).await.unwrap(),
        TrackerExit::Signal(9)
    );
}

#[tokio::test]
async fn truncated_handshake_is_an_error() {
    let script = "echo DMLC_TRACKER_ENV_START\necho A=1\nexit 0";
    let tracker = Tracker::new(1, fake_tracker(script)).unwrap();

    let err = tracker.start(Duration::ZERO).await.unwrap_err();
    assert!(err.is_protocol());
    assert!(tracker.worker_envs().is_empty());
    assert_eq!(
        tracker.wait_for(Duration::ZERO).await.unwrap(),
        TrackerExit::Code(0)
    );
}

#[tokio::test]
async fn second_start_is_rejected() {
    let tracker = running_tracker(1);
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    let result = tracker.start(Duration::ZERO).await;
    assert!(matches!(result, Err(TrackerError::AlreadyStarted)));

    tracker.stop();
    tracker.wait_for(Duration::ZERO).await.unwrap();
}

#[tokio::test]
async fn cancelled_wait_is_interrupted() {
    let tracker = running_tracker(2);
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let exit = tracker
        .wait_for_cancellable(Duration::ZERO, &cancel)
        .await
        .unwrap();
    assert_eq!(exit, TrackerExit::Interrupted);
    assert_eq!(tracker.state(), TrackerState::Running);

    tracker.stop();
    assert_eq!(
        tracker.wait_for(Duration::ZERO).await.unwrap(),
        TrackerExit::Signal(9)
    );
}

#[tokio::test]
async fn host_ip_is_passed_to_tracker() {
    let script = r#"
echo DMLC_TRACKER_ENV_START
echo "HOST=${3#--host-ip=}"
echo DMLC_TRACKER_ENV_END
"#;
    let config = TrackerConfig {
        host_ip: Some("10.9.8.7".to_string()),
        ..fake_tracker(script)
    };
    let tracker = Tracker::new(1, config).unwrap();
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    assert_eq!(tracker.worker_envs().get("HOST"), Some("10.9.8.7"));
    assert_eq!(
        tracker.wait_for(Duration::ZERO).await.unwrap(),
        TrackerExit::Code(0)
    );
}

#[tokio::test]
async fn worker_panic_stops_tracker_after_grace() {
    let tracker = Arc::new(running_tracker(2));
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    let started = Instant::now();
    let worker = tracker
        .supervise_worker("worker-0", || -> u32 { panic!("lost connection to tracker") })
        .unwrap();

    let exit = tracker.wait_for(Duration::ZERO).await.unwrap();
    assert_eq!(exit, TrackerExit::Signal(9));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(worker.join().unwrap(), None);
}

#[tokio::test]
async fn healthy_worker_leaves_tracker_alone() {
    let tracker = Arc::new(running_tracker(1));
    assert!(tracker.start(Duration::ZERO).await.unwrap());

    let worker = tracker.supervise_worker("worker-0", || 21 * 2).unwrap();
    assert_eq!(worker.join().unwrap(), Some(42));
    assert_eq!(tracker.state(), TrackerState::Running);

    tracker.stop();
    tracker.wait_for(Duration::ZERO).await.unwrap();
}

#[tokio::test]
async fn embedded_script_runs_and_is_removed() {
    const SCRIPT: &[u8] = b"echo DMLC_TRACKER_ENV_START
echo \"SCRIPT=$0\"
echo \"WORKERS=${2#--num-workers=}\"
echo DMLC_TRACKER_ENV_END
exit 0
";
    let bundle = ResourceBundle::new([EmbeddedResource::new("/tracker.sh", SCRIPT)]);
    let config = TrackerConfig {
        program: "sh".to_string(),
        ..Default::default()
    };
    let tracker = Tracker::with_embedded_script(3, config, &bundle, "/tracker.sh").unwrap();
    let script = tracker.script().unwrap().to_path_buf();

    assert!(tracker.start(Duration::ZERO).await.unwrap());
    let env = tracker.worker_envs();
    assert_eq!(env.get("SCRIPT"), script.to_str());
    assert_eq!(env.get("WORKERS"), Some("3"));
    assert_eq!(
        tracker.wait_for(Duration::ZERO).await.unwrap(),
        TrackerExit::Code(0)
    );

    assert!(script.exists());
    drop(tracker);
    assert!(!script.exists());
}
