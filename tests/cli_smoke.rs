//! CLI smoke tests - run the compiled binary against throwaway configs.
//!
//! Everything runs with `--dry-run` or without starting resources, so no
//! external tools or network access are required.

use std::path::{Path, PathBuf};
use std::process::Command;

const CONFIG: &str = r#"
[orchestrator.probe]
interval_ms = 10
timeout_secs = 5

[[resources]]
id = "typespec-api"
kind = "one-shot-job"
command = "npm"
args = ["run", "build"]

[[resources]]
id = "cosmos"
kind = "long-running-service"
command = "docker"
exports = { endpoint = "https://localhost:8081" }

[[resources]]
id = "seed-database"
kind = "one-shot-job"
command = "dotnet"
depends_on = ["cosmos"]
"#;

/// Helper: run devhost with given args and return (exit_code, stdout, stderr).
fn run_cli(args: &[&str]) -> (i32, String, String) {
    let bin = env!("CARGO_BIN_EXE_devhost");
    let output = Command::new(bin)
        .args(args)
        .env("RUST_LOG", "error") // suppress tracing noise
        .output()
        .expect("failed to execute devhost binary");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("devhost.toml");
    std::fs::write(&path, content).unwrap();
    path
}

// ============================================================================
// Help & Version
// ============================================================================

#[test]
fn cli_no_args_shows_help() {
    let (code, stdout, _stderr) = run_cli(&[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("devhost"));
}

#[test]
fn cli_help_lists_commands() {
    let (code, stdout, _stderr) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    for command in ["up", "plan", "check", "seed", "version"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn cli_version_command() {
    let (code, stdout, _stderr) = run_cli(&["version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("devhost"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_unknown_command_fails() {
    let (code, _stdout, stderr) = run_cli(&["deploy"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unrecognized subcommand"));
}

// ============================================================================
// Plan & Check
// ============================================================================

#[test]
fn cli_plan_prints_waves() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let (code, stdout, stderr) = run_cli(&["plan", "--config", config.to_str().unwrap()]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("Wave 1:"));
    assert!(stdout.contains("Wave 2:"));
    assert!(stdout.contains("seed-database (one-shot-job) <- cosmos"));
}

#[test]
fn cli_plan_rejects_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[[resources]]
id = "a"
kind = "one-shot-job"
command = "true"
depends_on = ["b"]

[[resources]]
id = "b"
kind = "one-shot-job"
command = "true"
depends_on = ["a"]
"#,
    );
    let (code, _stdout, stderr) = run_cli(&["plan", "-c", config.to_str().unwrap()]);
    assert_ne!(code, 0);
    assert!(stderr.contains("cycle"), "stderr: {}", stderr);
}

#[test]
fn cli_check_valid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let (code, stdout, _stderr) = run_cli(&["check", "--config", config.to_str().unwrap()]);
    assert_eq!(code, 0, "stdout: {}", stdout);
    assert!(stdout.contains("[OK]"));
    assert!(stdout.contains("startup waves"));
}

#[test]
fn cli_check_reports_typo_and_unknown_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[[resources]]
id = "seed-database"
kind = "one-shot-job"
comand = "dotnet"
depends_on = ["cosmso"]
"#,
    );
    let (code, stdout, _stderr) = run_cli(&["check", "--config", config.to_str().unwrap()]);
    assert_ne!(code, 0);
    assert!(stdout.contains("[ERROR]"));
    assert!(stdout.contains("command"));
}

#[test]
fn cli_check_missing_file() {
    let (code, _stdout, stderr) = run_cli(&["check", "--config", "/nonexistent/devhost.toml"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not found"));
}

// ============================================================================
// Up
// ============================================================================

#[test]
fn cli_up_dry_run_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let (code, stdout, stderr) = run_cli(&[
        "up",
        "--dry-run",
        "--once",
        "--config",
        config.to_str().unwrap(),
    ]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("Dry run"));
    assert!(stdout.contains("succeeded"));
    assert!(stdout.contains("completed"));
    assert!(stdout.contains("Stopped 1 service(s)."));
}

#[test]
fn cli_up_dry_run_jobs_only_exits() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[[resources]]
id = "build"
kind = "one-shot-job"
command = "make"
"#,
    );
    // No services, so there is nothing to supervise.
    let (code, stdout, stderr) = run_cli(&["up", "--dry-run", "-c", config.to_str().unwrap()]);
    assert_eq!(code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("build"));
}

#[test]
fn cli_up_failing_job_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[orchestrator]
logs_dir = "logs"

[orchestrator.probe]
interval_ms = 10
timeout_secs = 5

[[resources]]
id = "build"
kind = "one-shot-job"
command = "sh"
args = ["-c", "exit 3"]

[[resources]]
id = "deploy"
kind = "one-shot-job"
command = "true"
depends_on = ["build"]
"#,
    );
    let (code, stdout, stderr) = run_cli(&["up", "--once", "-c", config.to_str().unwrap()]);
    assert_ne!(code, 0);
    assert!(stdout.contains("exited with code 3"), "stdout: {}", stdout);
    assert!(stdout.contains("blocked by failed dependency: build"));
    assert!(stderr.contains("failed to start"));
    assert!(dir.path().join("logs").join("build.log").exists());
}

// ============================================================================
// Seed
// ============================================================================

#[test]
fn cli_seed_dry_run_counts_failures() {
    let dir = tempfile::tempdir().unwrap();
    let records = dir.path().join("records.json");
    std::fs::write(
        &records,
        r#"[{"id":"a"},{"id":"b"},{"name":"no id"},{"id":"c"},{"id":"d"}]"#,
    )
    .unwrap();

    let (code, stdout, _stderr) =
        run_cli(&["seed", "--dry-run", "--records", records.to_str().unwrap()]);
    assert_eq!(code, 0);
    assert!(stdout.contains("4 of 5 records seeded, 1 failed"));

    let (code, _stdout, stderr) = run_cli(&[
        "seed",
        "--dry-run",
        "--strict",
        "--records",
        records.to_str().unwrap(),
    ]);
    assert_ne!(code, 0);
    assert!(stderr.contains("1 record(s) failed"));
}

#[test]
fn cli_seed_requires_endpoint() {
    let (code, _stdout, stderr) = run_cli(&["seed", "--records", "seed/stores.json"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("--endpoint"));
}

#[test]
fn cli_seed_rejects_non_array() {
    let dir = tempfile::tempdir().unwrap();
    let records = dir.path().join("records.json");
    std::fs::write(&records, r#"{"id":"a"}"#).unwrap();
    let (code, _stdout, stderr) =
        run_cli(&["seed", "--dry-run", "--records", records.to_str().unwrap()]);
    assert_ne!(code, 0);
    assert!(stderr.contains("JSON array"));
}
