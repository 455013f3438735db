//! CLI Integration Tests
//!
//! These tests verify that the CLI commands work correctly end-to-end.
//! They test the actual binary behavior, not just the library.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::tempdir;

/// Address for a store in `dir` with background tasks disabled
fn store_addr(dir: &Path) -> String {
    format!("//{}?sync=0s&compact=0s", dir.join("store").display())
}

/// Run hashstore command and return (stdout, stderr, success)
fn run_hashstore(args: &[&str], addr: &str) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_hashstore"))
        .args(["-s", addr, "-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute hashstore");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn parse(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim()).expect("stdout should be JSON")
}

// ============================================================================
// Point Operations
// ============================================================================

#[test]
fn test_cli_put_and_get() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    let (stdout, _stderr, success) = run_hashstore(&["put", "greeting", "hello"], &addr);
    assert!(success, "put should succeed");
    assert!(stdout.contains("\"status\":\"ok\""), "should return ok status");

    let (stdout, _stderr, success) = run_hashstore(&["get", "greeting"], &addr);
    assert!(success, "get should succeed");
    let value = parse(&stdout);
    assert_eq!(value["value"], "hello");
    assert_eq!(value["encoding"], "utf8");
    assert_eq!(value["size"], 5);
}

#[test]
fn test_cli_put_existing_key_fails_without_replace() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    run_hashstore(&["put", "k", "first"], &addr);
    let (_stdout, stderr, success) = run_hashstore(&["put", "k", "second"], &addr);
    assert!(!success, "create-only put of an existing key should fail");
    assert!(stderr.contains("already exists"), "got: {}", stderr);

    let (stdout, _, _) = run_hashstore(&["get", "k"], &addr);
    assert_eq!(parse(&stdout)["value"], "first");

    let (_stdout, _stderr, success) = run_hashstore(&["put", "k", "second", "--replace"], &addr);
    assert!(success, "replacing put should succeed");
    let (stdout, _, _) = run_hashstore(&["get", "k"], &addr);
    assert_eq!(parse(&stdout)["value"], "second");
}

#[test]
fn test_cli_get_nonexistent_key() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    let (stdout, _stderr, success) = run_hashstore(&["get", "nonexistent"], &addr);
    assert!(!success, "get nonexistent should fail");
    assert!(stdout.contains("\"status\":\"error\""));
}

#[test]
fn test_cli_delete() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    run_hashstore(&["put", "doomed", "x"], &addr);
    let (_stdout, _stderr, success) = run_hashstore(&["delete", "doomed"], &addr);
    assert!(success, "delete should succeed");

    let (_stdout, _stderr, success) = run_hashstore(&["get", "doomed"], &addr);
    assert!(!success, "deleted key should be gone");

    let (_stdout, stderr, success) = run_hashstore(&["delete", "doomed"], &addr);
    assert!(!success, "deleting a missing key should fail");
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_cli_put_from_stdin_and_hex_output() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    let mut child = Command::new(env!("CARGO_BIN_EXE_hashstore"))
        .args(["-s", &addr, "put", "binary"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to execute hashstore");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&[0x00, 0xff, 0x10])
        .unwrap();
    assert!(child.wait().unwrap().success());

    let (stdout, _stderr, success) = run_hashstore(&["get", "binary"], &addr);
    assert!(success);
    let value = parse(&stdout);
    assert_eq!(value["encoding"], "hex");
    assert_eq!(value["value"], "00ff10");
}

#[test]
fn test_cli_put_from_file_and_get_to_file() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());
    let input = dir.path().join("input.bin");
    let output = dir.path().join("output.bin");
    std::fs::write(&input, b"file contents").unwrap();

    let (_stdout, _stderr, success) = run_hashstore(
        &["put", "from-file", "--file", input.to_str().unwrap()],
        &addr,
    );
    assert!(success);

    let (_stdout, _stderr, success) = run_hashstore(
        &["get", "from-file", "--out", output.to_str().unwrap()],
        &addr,
    );
    assert!(success);
    assert_eq!(std::fs::read(&output).unwrap(), b"file contents");
}

// ============================================================================
// Listing
// ============================================================================

#[test]
fn test_cli_list_is_ordered() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    for key in ["b", "a", "c"] {
        run_hashstore(&["put", key, "v"], &addr);
    }

    let (stdout, _stderr, success) = run_hashstore(&["list"], &addr);
    assert!(success, "list should succeed");
    let value = parse(&stdout);
    assert_eq!(value["count"], 3);
    assert_eq!(value["keys"], serde_json::json!(["a", "b", "c"]));

    let (stdout, _, _) = run_hashstore(&["list", "--start", "b"], &addr);
    assert_eq!(parse(&stdout)["keys"], serde_json::json!(["b", "c"]));

    let (stdout, _, _) = run_hashstore(&["list", "--limit", "1"], &addr);
    assert_eq!(parse(&stdout)["keys"], serde_json::json!(["a"]));
}

#[test]
fn test_cli_len() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    let (stdout, _, _) = run_hashstore(&["len"], &addr);
    assert_eq!(parse(&stdout)["count"], 0);

    run_hashstore(&["put", "one", "1"], &addr);
    run_hashstore(&["put", "two", "2"], &addr);
    run_hashstore(&["put", "two", "22", "--replace"], &addr);

    let (stdout, _, _) = run_hashstore(&["len"], &addr);
    assert_eq!(parse(&stdout)["count"], 2);
}

// ============================================================================
// Maintenance
// ============================================================================

#[test]
fn test_cli_stats_and_compact() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    run_hashstore(&["put", "k", "1"], &addr);
    run_hashstore(&["put", "k", "2", "--replace"], &addr);

    let (stdout, _, success) = run_hashstore(&["stats"], &addr);
    assert!(success);
    let stats = parse(&stdout);
    assert_eq!(stats["keys"], 1);
    assert!(stats["dead_bytes"].as_u64().unwrap() > 0);

    let (stdout, _, success) = run_hashstore(&["compact"], &addr);
    assert!(success);
    let result = parse(&stdout);
    assert_eq!(result["compacted"], true);
    assert_eq!(result["live_records"], 1);

    let (stdout, _, _) = run_hashstore(&["stats"], &addr);
    assert_eq!(parse(&stdout)["dead_bytes"], 0);

    let (stdout, _, _) = run_hashstore(&["get", "k"], &addr);
    assert_eq!(parse(&stdout)["value"], "2");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_cli_bad_interval_rejected() {
    let dir = tempdir().unwrap();
    let addr = format!("//{}?sync=whenever", dir.path().join("store").display());

    let (_stdout, stderr, success) = run_hashstore(&["len"], &addr);
    assert!(!success, "malformed interval should fail");
    assert!(stderr.contains("invalid sync interval"), "got: {}", stderr);
}

#[test]
fn test_cli_store_from_environment() {
    let dir = tempdir().unwrap();
    let addr = store_addr(dir.path());

    let output = Command::new(env!("CARGO_BIN_EXE_hashstore"))
        .env("HASHSTORE_ADDR", &addr)
        .args(["put", "env", "value"])
        .output()
        .expect("Failed to execute hashstore");
    assert!(output.status.success());

    let (stdout, _, _) = run_hashstore(&["get", "env"], &addr);
    assert_eq!(parse(&stdout)["value"], "value");
}
