// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn demo_system() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../configs/systems/soc-demo.yaml")
}

fn get_temp_path(prefix: &str, extension: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("errwatch-tests");
    let _ = std::fs::create_dir_all(&dir);

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    dir.join(format!("{}-{}.{}", prefix, nonce, extension))
}

#[test]
fn test_run_counts_injected_faults() {
    let output = Command::new(env!("CARGO_BIN_EXE_errwatch"))
        .args([
            "run",
            "--system",
            demo_system().to_str().unwrap(),
            "--inject",
            "ETH(0)-MAC:1",
            "--inject",
            "CACHE(0)-L2:0",
        ])
        .output()
        .expect("Failed to execute errwatch");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tx fifo parity: 1"), "stdout: {}", stdout);
    assert!(stdout.contains("rx fifo parity: 0"));
    assert!(stdout.contains("tag ce: 1"));
    assert!(stdout.contains("pos error: Ignored"));
}

#[test]
fn test_interrupt_mode_leaves_polled_fields() {
    let output = Command::new(env!("CARGO_BIN_EXE_errwatch"))
        .args([
            "run",
            "--system",
            demo_system().to_str().unwrap(),
            "--mode",
            "interrupt",
            "--inject",
            "CACHE(0)-L2:1",
        ])
        .output()
        .expect("Failed to execute errwatch");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("data ue: 0"), "stdout: {}", stdout);
}

#[test]
fn test_run_writes_json_report() {
    let json_path = get_temp_path("report", "json");
    let output = Command::new(env!("CARGO_BIN_EXE_errwatch"))
        .args([
            "run",
            "--system",
            demo_system().to_str().unwrap(),
            "--inject",
            "PCIE(0)-AXI:2",
            "--json",
            json_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute errwatch");
    assert!(output.status.success());

    let content = std::fs::read_to_string(&json_path).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(doc["system"], "soc-demo");
    assert_eq!(doc["report"]["error_threshold"], 8);
    assert_eq!(doc["report"]["modules"][1]["name"], "PCIE(0)-AXI");
    assert_eq!(doc["report"]["modules"][1]["fields"][2]["counter"], 1);
    assert_eq!(doc["controllers"]["PCIE(0)-AXI"][1]["groups"][2]["cause"], 0);
}

#[test]
fn test_unknown_injection_is_config_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_errwatch"))
        .args([
            "run",
            "--system",
            demo_system().to_str().unwrap(),
            "--inject",
            "ETH(0)-MAC:99",
        ])
        .output()
        .expect("Failed to execute errwatch");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_system_is_config_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_errwatch"))
        .args(["selftest", "--system", "/nonexistent/system.yaml"])
        .output()
        .expect("Failed to execute errwatch");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_selftest_demo_system_passes() {
    let output = Command::new(env!("CARGO_BIN_EXE_errwatch"))
        .args(["selftest", "--system", demo_system().to_str().unwrap()])
        .output()
        .expect("Failed to execute errwatch");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {}", stdout);
    assert!(stdout.contains("ETH(0)-MAC: PASS"));
    assert!(stdout.contains("CACHE(0)-L2: PASS"));
    assert!(stdout.contains("Self-test PASSED"));
}
