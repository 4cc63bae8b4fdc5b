//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against an isolated HOME so the
//! real data directory is never touched.

use std::path::Path;
use std::process::Command;

/// Run a CLI command with HOME pointed at `home` and return output.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "momentum-cli", "--quiet", "--"])
        .args(args)
        .env("HOME", home)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn state_set_get_round_trip() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["state", "set", "current_task", "\"inbox\""]);
    assert_eq!(code, 0, "state set failed: {stderr}");

    let (stdout, _, code) = run_cli(home.path(), &["state", "get", "current_task"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("inbox"));
}

#[test]
fn state_get_missing_prints_default() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(
        home.path(),
        &["state", "get", "missing", "--default", "42"],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("42"));
}

#[test]
fn energy_and_calibrate_flow() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["energy", "set", "2"]);
    assert_eq!(code, 0, "energy set failed: {stderr}");

    let (stdout, _, code) = run_cli(home.path(), &["calibrate", "30"]);
    assert_eq!(code, 0);
    // Low energy means the calibrated estimate exceeds the raw one.
    assert!(stdout.contains("calibrated_estimate"));
    assert!(stdout.contains("Block"));
}

#[test]
fn task_log_and_history() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(home.path(), &["task", "log", "coding", "30", "45"]);
    assert_eq!(code, 0, "task log failed: {stderr}");
    assert!(stdout.contains("ratio = 1.50"));

    let (stdout, _, code) = run_cli(home.path(), &["task", "history"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("coding"));
}

#[test]
fn cache_store_and_check() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["cache", "store", "write tests", r#"{"steps":["a","b"]}"#],
    );
    assert_eq!(code, 0, "cache store failed: {stderr}");

    // Normalization-equivalent description hits the same entry.
    let (stdout, _, code) = run_cli(home.path(), &["cache", "check", "  Write Tests  "]);
    assert_eq!(code, 0);
    assert!(stdout.contains("steps"));
}

#[test]
fn stats_show_reports_defaults() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["stats", "show"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("current_energy"));
    assert!(stdout.contains("tasks_completed_today"));
}

#[test]
fn session_lifecycle() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["session", "create", "--user", "vince", "--id", "s1"],
    );
    assert_eq!(code, 0, "session create failed: {stderr}");
    assert!(stdout.contains("s1"));

    let (_, _, code) = run_cli(home.path(), &["session", "patch", "s1", r#"{"topic":"planning"}"#]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["session", "show", "s1"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("planning"));

    let (stdout, _, code) = run_cli(home.path(), &["session", "delete", "s1"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("deleted"));
}
