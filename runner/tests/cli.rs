//! CLI tests for `release-runner init`, `validate` and `run`.
//!
//! Spawns the binary and verifies exit codes. None of these reach a server:
//! each case fails or finishes before a connection would be opened.

use std::fs;
use std::path::Path;
use std::process::Command;

use release_runner::exit_codes;
use release_runner::io::config::{RunConfig, load_config, write_config};

fn runner(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_release-runner"));
    cmd.current_dir(dir);
    cmd
}

fn write_missing_root_config(dir: &Path) {
    let cfg = RunConfig {
        connection_string: "postgres://release@localhost:5432/app".to_string(),
        script_root: dir.join("no-such-release"),
        log_file: dir.join("logs").join("run.log"),
        ..RunConfig::default()
    };
    write_config(&dir.join("release-runner.toml"), &cfg).expect("write config");
}

#[test]
fn init_writes_a_loadable_template() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = runner(temp.path())
        .arg("init")
        .status()
        .expect("release-runner init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("release-runner.toml")).expect("load template");
    assert_eq!(cfg, RunConfig::template());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("release-runner.toml");
    fs::write(&path, "timeout_minutes = 5\n").expect("write existing");

    let output = runner(temp.path())
        .arg("init")
        .output()
        .expect("release-runner init");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--force"));
    assert_eq!(
        fs::read_to_string(&path).expect("read existing"),
        "timeout_minutes = 5\n"
    );

    let status = runner(temp.path())
        .args(["init", "--force"])
        .status()
        .expect("release-runner init --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn validate_rejects_missing_script_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_missing_root_config(temp.path());

    let output = runner(temp.path())
        .arg("validate")
        .output()
        .expect("release-runner validate");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("doesn't exist"));
    assert!(!temp.path().join("logs").exists(), "validate must not touch the log");
}

#[test]
fn run_with_missing_root_writes_the_log_and_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_missing_root_config(temp.path());

    let output = runner(temp.path())
        .arg("run")
        .output()
        .expect("release-runner run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let log = fs::read_to_string(temp.path().join("logs").join("run.log")).expect("read log");
    assert!(log.starts_with("Error Message: script folder "));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Error Message: "));
}

#[test]
fn run_exit_zero_keeps_status_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_missing_root_config(temp.path());

    let status = runner(temp.path())
        .args(["run", "--exit-zero"])
        .status()
        .expect("release-runner run --exit-zero");

    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn run_without_config_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = runner(temp.path())
        .arg("run")
        .status()
        .expect("release-runner run");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
