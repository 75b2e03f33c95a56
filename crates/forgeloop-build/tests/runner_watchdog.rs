//! Real child processes under the hard timeout and the idle watchdog.
#![cfg(unix)]

use std::time::{Duration, Instant};

use forgeloop_build::{
    BuildError, CommandOutcome, CommandRunner, CommandSpec, KILLED_EXIT_CODE, SystemRunner,
};
use tempfile::TempDir;

fn sh(dir: &TempDir, script: &str) -> CommandSpec {
    CommandSpec::new("sh", dir.path()).args(["-c", script])
}

#[tokio::test]
async fn test_natural_exit_captures_output() {
    let dir = TempDir::new().unwrap();
    let result = SystemRunner::new()
        .run(&sh(&dir, "echo out; echo err >&2; exit 3"), Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(result.outcome, CommandOutcome::Exited);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert!(!result.is_success());
    assert_eq!(result.command, "sh -c 'echo out; echo err >&2; exit 3'");
}

#[tokio::test]
async fn test_runs_in_working_directory_with_env() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
    let spec = sh(&dir, "cat marker.txt; printf \" $FORGE_VALUE\"").env("FORGE_VALUE", "42");
    let result = SystemRunner::new()
        .run(&spec, Duration::from_secs(10))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.stdout, "here 42");
}

#[tokio::test]
async fn test_exit_with_background_child_is_not_a_hang() {
    let dir = TempDir::new().unwrap();
    let started = Instant::now();
    let result = SystemRunner::new()
        .run_watched(
            &sh(&dir, "sleep 4 & echo hi; exit 0"),
            Duration::from_secs(20),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.outcome, CommandOutcome::Exited);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "hi\n");
    assert!(!result.stderr.contains("[watchdog]"));
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
}

#[tokio::test]
async fn test_silent_process_is_killed_by_watchdog() {
    let dir = TempDir::new().unwrap();
    let started = Instant::now();
    let result = SystemRunner::new()
        .run_watched(
            &sh(&dir, "echo started; sleep 30"),
            Duration::from_secs(20),
            Duration::from_millis(500),
        )
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(result.outcome, CommandOutcome::IdleTimeout);
    assert_eq!(result.exit_code, KILLED_EXIT_CODE);
    assert_eq!(result.stdout, "started\n");
    assert!(result.stderr.contains("[watchdog] sh idle > 0.5s; killed"));
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
}

#[tokio::test]
async fn test_chatty_process_hits_hard_timeout() {
    let dir = TempDir::new().unwrap();
    let started = Instant::now();
    let result = SystemRunner::new()
        .run_watched(
            &sh(&dir, "while true; do echo tick; sleep 0.1; done"),
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(result.outcome, CommandOutcome::HardTimeout);
    assert_eq!(result.exit_code, KILLED_EXIT_CODE);
    assert!(result.stdout.starts_with("tick\n"));
    assert!(result.stderr.contains("[timeout] sh exceeded 1s; killed"));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_plain_run_has_no_idle_watchdog() {
    let dir = TempDir::new().unwrap();
    let result = SystemRunner::new()
        .run(&sh(&dir, "sleep 1; echo late"), Duration::from_secs(10))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(result.stdout, "late\n");
}

/// Running and not a zombie.
#[cfg(target_os = "linux")]
fn is_running(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z"),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_hard_timeout_kills_process_group() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("child.pid");
    let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());
    let result = SystemRunner::new()
        .run(&sh(&dir, &script), Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(result.outcome, CommandOutcome::HardTimeout);

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!is_running(pid.trim()), "background child survived the kill");
}

#[tokio::test]
async fn test_missing_binary_is_reported() {
    let dir = TempDir::new().unwrap();
    let spec = CommandSpec::new("forgeloop-definitely-missing-binary", dir.path());
    let err = SystemRunner::new()
        .run(&spec, Duration::from_secs(1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::NotFound { ref program } if program == "forgeloop-definitely-missing-binary"
    ));
}

#[tokio::test]
async fn test_output_is_capped() {
    let dir = TempDir::new().unwrap();
    let result = SystemRunner::new()
        .with_max_output(10)
        .run(&sh(&dir, "printf '0123456789abcdef'"), Duration::from_secs(5))
        .await
        .unwrap();

    assert!(result.stdout.starts_with("0123456789..."));
    assert!(result.stdout.contains("16 bytes total"));
}
