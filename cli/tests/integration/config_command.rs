//! Integration tests for `devbox config`.
//!
//! All filesystem-touching tests set `DEVBOX_CONFIG` to a temp path so they
//! never read or write `~/.devbox/config.yaml`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn devbox() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("devbox"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Returns a `TempDir` and the path string for a config file inside it.
fn temp_config_path() -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir
        .path()
        .join("config.yaml")
        .to_string_lossy()
        .into_owned();
    (dir, path)
}

#[test]
fn test_config_help_shows_show_and_set_subcommands() {
    devbox()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("set"));
}

#[test]
fn test_config_show_without_file_prints_defaults() {
    let (_dir, path) = temp_config_path();
    devbox()
        .args(["config", "show"])
        .env("DEVBOX_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("t3.medium"))
        .stdout(predicate::str::contains("volume.tier"))
        .stdout(predicate::str::contains("DEVBOX_CONFIG"));
}

#[test]
fn test_config_show_does_not_create_file() {
    let (_dir, path) = temp_config_path();
    devbox()
        .args(["config", "show"])
        .env("DEVBOX_CONFIG", &path)
        .assert()
        .success();
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_config_set_then_show_roundtrip() {
    let (_dir, path) = temp_config_path();
    devbox()
        .args(["config", "set", "volume.tier", "performance"])
        .env("DEVBOX_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Set volume.tier = performance"));

    let output = devbox()
        .args(["config", "show", "--json"])
        .env("DEVBOX_CONFIG", &path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["volume"]["tier"], "performance");
}

#[test]
fn test_config_set_unknown_key_fails() {
    let (_dir, path) = temp_config_path();
    devbox()
        .args(["config", "set", "instance.flavor", "large"])
        .env("DEVBOX_CONFIG", &path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown setting: instance.flavor"));
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_config_set_invalid_tier_lists_valid_values() {
    let (_dir, path) = temp_config_path();
    devbox()
        .args(["config", "set", "volume.tier", "turbo"])
        .env("DEVBOX_CONFIG", &path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("standard, performance, provisioned"));
}

#[test]
fn test_config_set_invalid_key_json_error_code() {
    let (_dir, path) = temp_config_path();
    let output = devbox()
        .args(["config", "set", "nope", "1", "--json"])
        .env("DEVBOX_CONFIG", &path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert_eq!(v["code"], "INVALID_CONFIG");
}

#[cfg(unix)]
#[test]
fn test_config_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let (_dir, path) = temp_config_path();
    devbox()
        .args(["config", "set", "owner", "alice"])
        .env("DEVBOX_CONFIG", &path)
        .assert()
        .success();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
