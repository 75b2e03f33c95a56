use std::path::Path;

use assert_cmd::Command;
use forgeloop_ai::{AgentReport, ExitReason, LastRunRecord};
use predicates::str::contains;
use tempfile::TempDir;

fn forgeloop(config_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("forgeloop"));
    cmd.env_remove("FORGELOOP_CONFIG")
        .env_remove("OPENAI_API_KEY")
        .env_remove("FORGELOOP_WORKSPACE")
        .env("RUST_LOG", "warn")
        .arg("--config")
        .arg(config_dir.join("config.toml"));
    cmd
}

fn write_config(dir: &TempDir) {
    let state_dir = dir.path().join("state");
    std::fs::write(
        dir.path().join("config.toml"),
        format!("[agent]\nstate_dir = {:?}\n", state_dir.display().to_string()),
    )
    .unwrap();
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("forgeloop"));
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(contains("Forgeloop"))
        .stdout(contains("agent"))
        .stdout(contains("repair"))
        .stdout(contains("last-run"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("forgeloop"));
    cmd.arg("--version").assert().success();
}

#[test]
fn test_last_run_without_record() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);

    forgeloop(dir.path())
        .arg("last-run")
        .assert()
        .failure()
        .stderr(contains("no agent run recorded yet"));
}

#[test]
fn test_last_run_prints_record() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);
    let report = AgentReport {
        job_id: "job-42".to_string(),
        summary: "DONE: Agent run completed (turn cap reached; 3 turn(s), 0 tool call(s))."
            .to_string(),
        tool_log: Vec::new(),
        diff_preview: "Files: 2".to_string(),
        exit_reason: ExitReason::TurnCap,
        turns: 3,
        validate_only: false,
    };
    LastRunRecord::from_report(&report, 200)
        .save(&dir.path().join("state/last_run.json"))
        .unwrap();

    forgeloop(dir.path())
        .arg("last-run")
        .assert()
        .success()
        .stdout(contains("job-42"))
        .stdout(contains("turn cap reached"));

    let output = forgeloop(dir.path())
        .args(["last-run", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["job_id"], "job-42");
    assert_eq!(value["exit_reason"], "turn_cap");
}

#[test]
fn test_missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();

    forgeloop(dir.path())
        .arg("last-run")
        .assert()
        .failure()
        .stderr(contains("failed to read config file"));
}

#[test]
fn test_agent_requires_api_key() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);
    let spec = dir.path().join("spec.json");
    std::fs::write(&spec, r#"{"name": "todo_app"}"#).unwrap();

    forgeloop(dir.path())
        .arg("agent")
        .arg(&spec)
        .arg("--workspace")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("no API key configured"));
}

#[test]
fn test_repair_rejects_missing_project() {
    let dir = TempDir::new().unwrap();
    write_config(&dir);

    forgeloop(dir.path())
        .arg("repair")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(contains("does not exist"));
}
