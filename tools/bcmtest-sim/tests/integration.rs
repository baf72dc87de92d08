//! Integration tests for bcmtest-sim.
//!
//! These run the built binary as a subprocess against the scenarios in
//! `tests/fixtures/`.

use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn sim(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bcmtest-sim"))
        .args(args)
        .output()
        .expect("failed to execute bcmtest-sim")
}

fn assert_success(output: &Output, what: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "{what} failed (exit={:?}):\nstdout:\n{stdout}\nstderr:\n{stderr}",
        output.status.code(),
    );
}

fn run_json(name: &str) -> serde_json::Value {
    let path = fixture(name);
    let output = sim(&["run", "--json", path.to_str().unwrap()]);
    assert_success(&output, "bcmtest-sim run");
    serde_json::from_slice(&output.stdout).expect("run --json printed invalid JSON")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn single_card_lifecycle() {
    let report = run_json("single_bar.toml");
    assert_eq!(report["probed"], 2);
    assert_eq!(report["matched"], 1);
    assert_eq!(report["attached"][0]["address"], "00:03.0");
    assert_eq!(report["attached"][0]["node"], "test0");
    assert_eq!(report["attached"][0]["bars"], 1);
    assert_eq!(report["io"][0]["node"], "test0");
    assert_eq!(report["io"][0]["requested_read"], 64);
    assert_eq!(report["io"][0]["read"], 0);
    assert_eq!(report["io"][0]["written"], 0);
    assert_eq!(report["leaked_reservations"], 0);
    assert_eq!(report["leftover_nodes"].as_array().map(Vec::len), Some(0));
}

#[test]
fn failed_bar_unwinds_attach() {
    let report = run_json("bar_failure.toml");
    assert_eq!(report["matched"], 2);
    assert_eq!(report["attached"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["attached"][0]["bars"], 2);
    assert_eq!(report["failed"][0]["address"], "00:05.0");
    assert_eq!(report["failed"][0]["error"], "resource unavailable");
    assert_eq!(report["leaked_reservations"], 0);
}

#[test]
fn driver_messages_go_to_stderr() {
    let path = fixture("single_bar.toml");
    let output = sim(&["run", path.to_str().unwrap()]);
    assert_success(&output, "bcmtest-sim run");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[INFO] test0: asked to read 64 bytes"), "stderr:\n{stderr}");
    assert!(stderr.contains("test pci device shutdown"), "stderr:\n{stderr}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("teardown clean"), "stdout:\n{stdout}");
}

#[test]
fn quiet_suppresses_progress() {
    let path = fixture("single_bar.toml");
    let output = sim(&["-q", "run", path.to_str().unwrap()]);
    assert_success(&output, "bcmtest-sim -q run");
    assert!(!String::from_utf8_lossy(&output.stderr).contains("[INFO]"));
}

#[test]
fn probe_subcommand() {
    let output = sim(&["probe", "--vendor", "0x14e4", "--device", "0x43a0"]);
    assert_success(&output, "bcmtest-sim probe");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "match: bcm43a0");

    let output = sim(&["probe", "--vendor", "0x14e4", "--device", "0x43a1"]);
    assert_success(&output, "bcmtest-sim probe");
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "no match");
}

#[test]
fn invalid_scenario_is_rejected() {
    let path = fixture("invalid.toml");
    let output = sim(&["check", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid [driver] table"));
}
