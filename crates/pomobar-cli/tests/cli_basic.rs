//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run with HOME pointed at a temp
//! directory so config reads/writes never touch the real user config.

use std::path::Path;
use std::process::Command;

fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO"))
        .args(["run", "--quiet", "-p", "pomobar-cli", "--"])
        .args(args)
        .env("HOME", home)
        .output()
        .expect("failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn config_get_returns_defaults() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "timer.focus_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "25");
}

#[test]
fn config_set_roundtrips() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["config", "set", "timer.focus_minutes", "50"]);
    assert_eq!(code, 0);

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "timer.focus_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "50");
}

#[test]
fn config_get_unknown_key_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "timer.bogus"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn config_set_rejects_bad_value() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["config", "set", "timer.auto_start_next", "maybe"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("auto_start_next"));
}
