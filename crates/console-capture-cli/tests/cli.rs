//! Binary-level tests that need no browser.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn console_capture(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("console-capture").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let temp = TempDir::new().unwrap();

    console_capture(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("capture"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_config_prints_defaults() {
    let temp = TempDir::new().unwrap();

    console_capture(&temp)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("protocol_version = \"1.3\""))
        .stdout(predicate::str::contains("chrome://"))
        .stdout(predicate::str::contains("backend = \"memory\""));
}

#[test]
fn test_config_picks_up_default_file_and_env() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("console-capture.toml"),
        "notification_capacity = 16\n",
    )
    .unwrap();

    console_capture(&temp)
        .arg("config")
        .env("CONSOLE_CAPTURE_STORE__BACKEND", "redb")
        .assert()
        .success()
        .stdout(predicate::str::contains("notification_capacity = 16"))
        .stdout(predicate::str::contains("backend = \"redb\""));
}

#[test]
fn test_invalid_config_fails_with_hint() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.toml");
    fs::write(&path, "notification_capacity = \"lots\"\n").unwrap();

    console_capture(&temp)
        .arg("config")
        .arg("--config")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_capture_rejects_unknown_category() {
    let temp = TempDir::new().unwrap();

    console_capture(&temp)
        .args(["capture", "https://example.com", "--category", "everything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
