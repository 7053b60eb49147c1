//! CLI Integration Tests
//!
//! These tests run the `smartlog` binary against small shell commands and
//! check what is printed (or withheld) for each outcome.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A CLI command pinned to an empty config file so the user's config is ignored
fn cli_cmd(config_dir: &TempDir) -> Command {
    let config = config_dir.path().join("smartlog.json");
    std::fs::write(&config, r#"{"captureExternalConsole": true}"#).unwrap();

    let mut cmd = Command::cargo_bin("smartlog").expect("Failed to find smartlog binary");
    cmd.env_remove("SMARTLOG_CONFIG");
    cmd.arg("run").arg("--config").arg(config);
    cmd
}

fn sh(cmd: &mut Command, script: &str) -> assert_cmd::assert::Assert {
    cmd.args(["--", "sh", "-c", script]).assert()
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_passing_command_is_silent() {
    let dir = TempDir::new().unwrap();

    sh(&mut cli_cmd(&dir), "echo hidden output")
        .success()
        .stdout(predicate::str::contains("hidden output").not())
        .stdout(predicate::str::contains("Smart Logger Output").not());
}

#[test]
fn test_failing_command_flushes_captured_output() {
    let dir = TempDir::new().unwrap();

    sh(&mut cli_cmd(&dir), "echo step one; echo broken >&2; exit 3")
        .code(3)
        .stdout(predicate::str::contains("=== Smart Logger Output ==="))
        .stdout(predicate::str::contains("[LOG] [EXTERNAL] step one"))
        .stdout(predicate::str::contains("[ERROR] [EXTERNAL] broken"))
        .stdout(predicate::str::contains("Exited with code 3"))
        .stdout(predicate::str::contains("=== End Smart Logger Output ==="));
}

#[test]
fn test_flush_on_pass() {
    let dir = TempDir::new().unwrap();
    let mut cmd = cli_cmd(&dir);
    cmd.args(["--flush-on", "pass"]);

    sh(&mut cmd, "echo now visible")
        .success()
        .stdout(predicate::str::contains("now visible"));
}

#[test]
fn test_skip_code_maps_to_skipped() {
    let dir = TempDir::new().unwrap();

    // Default triggers do not include skip
    let mut cmd = cli_cmd(&dir);
    cmd.args(["--skip-code", "77"]);
    sh(&mut cmd, "echo skipping; exit 77")
        .code(77)
        .stdout(predicate::str::contains("skipping").not());

    let mut cmd = cli_cmd(&dir);
    cmd.args(["--skip-code", "77", "--flush-on", "skip"]);
    sh(&mut cmd, "echo skipping; exit 77")
        .code(77)
        .stdout(predicate::str::contains("skipping"));
}

#[test]
fn test_retry_attempt_flushes_even_when_passing() {
    let dir = TempDir::new().unwrap();
    let mut cmd = cli_cmd(&dir);
    cmd.args(["--retry", "1"]);

    sh(&mut cmd, "echo second attempt")
        .success()
        .stdout(predicate::str::contains("second attempt"));
}

#[test]
fn test_timeout_kills_command() {
    let dir = TempDir::new().unwrap();
    let mut cmd = cli_cmd(&dir);
    cmd.args(["--timeout", "1", "--flush-on", "timeout"]);

    sh(&mut cmd, "echo started; exec sleep 10")
        .code(124)
        .stdout(predicate::str::contains("started"))
        .stdout(predicate::str::contains("Timed out after 1s"));
}

#[test]
fn test_attach_dir_writes_one_file_per_flush() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("logs");
    let mut cmd = cli_cmd(&dir);
    cmd.args(["--title", "Login works", "--attach-dir"]).arg(&out);

    sh(&mut cmd, "echo evidence; exit 1").code(1);

    let written = std::fs::read_to_string(out.join("login-works-smart-log-1.txt")).unwrap();
    assert!(written.starts_with("Smart Logger Output - Login works\n"));
    assert!(written.contains("[EXTERNAL] evidence"));
    assert!(!out.join("login-works-smart-log-2.txt").exists());
}

#[test]
fn test_repeated_runs_keep_earlier_attachments() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("logs");

    let mut first = cli_cmd(&dir);
    first.args(["--title", "Login works", "--attach-dir"]).arg(&out);
    sh(&mut first, "echo first attempt; exit 1").code(1);

    let mut second = cli_cmd(&dir);
    second.args(["--title", "Login works", "--retry", "1", "--attach-dir"]).arg(&out);
    sh(&mut second, "echo second attempt").success();

    let earlier = std::fs::read_to_string(out.join("login-works-smart-log-1.txt")).unwrap();
    let later = std::fs::read_to_string(out.join("login-works-smart-log-2.txt")).unwrap();
    assert!(earlier.contains("first attempt"));
    assert!(later.contains("second attempt"));
}

#[test]
fn test_max_buffer_size_evicts_oldest() {
    let dir = TempDir::new().unwrap();
    let mut cmd = cli_cmd(&dir);
    cmd.args(["--max-buffer-size", "2"]);

    sh(&mut cmd, "echo first; echo second; exit 1")
        .code(1)
        .stdout(predicate::str::contains("first").not())
        .stdout(predicate::str::contains("second"))
        .stdout(predicate::str::contains("Exited with code 1"));
}

#[test]
fn test_no_capture_passes_output_through() {
    let dir = TempDir::new().unwrap();
    let mut cmd = cli_cmd(&dir);
    cmd.arg("--no-capture");

    sh(&mut cmd, "echo straight through")
        .success()
        .stdout(predicate::str::contains("straight through"));
}

#[test]
fn test_missing_program_fails() {
    let dir = TempDir::new().unwrap();

    cli_cmd(&dir)
        .args(["--", "/nonexistent/program"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to start"));
}

#[test]
fn test_invalid_trigger_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut cmd = cli_cmd(&dir);
    cmd.args(["--flush-on", "fail,sometimes"]);

    sh(&mut cmd, "true")
        .failure()
        .stderr(predicate::str::contains("unknown flush trigger"));
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_prints_merged_options() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("smartlog.json");
    std::fs::write(&config, r#"{"flushOn": ["pass"], "capturePageConsole": true}"#).unwrap();

    Command::cargo_bin("smartlog")
        .unwrap()
        .env_remove("SMARTLOG_CONFIG")
        .args(["config", "--max-buffer-size", "10", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"flushTriggers\": [\n    \"pass\"\n  ]"))
        .stdout(predicate::str::contains("\"maxBufferSize\": 10"))
        .stdout(predicate::str::contains("\"captureExternalConsole\": true"))
        .stdout(predicate::str::contains("\"attachToReport\": false"));
}

#[test]
fn test_config_rejects_zero_buffer() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("smartlog.json");
    std::fs::write(&config, r#"{"maxBufferSize": 0}"#).unwrap();

    Command::cargo_bin("smartlog")
        .unwrap()
        .env_remove("SMARTLOG_CONFIG")
        .args(["config", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("maxBufferSize"));
}
