//! CLI integration tests

use std::process::Command;

fn neoctl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_neoctl"));
    cmd.env_remove("NEOCTL_API_URL");
    cmd
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = neoctl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("NEO hazard"), "Should show app name");
    assert!(stdout.contains("train"), "Should show train command");
    assert!(stdout.contains("reload"), "Should show reload command");
    assert!(stdout.contains("predict"), "Should show predict command");
    assert!(stdout.contains("risk"), "Should show risk command");
    assert!(stdout.contains("models"), "Should show models command");
    assert!(stdout.contains("status"), "Should show status command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = neoctl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("neoctl"), "Should show binary name");
}

#[test]
fn test_train_range_help() {
    let output = neoctl()
        .args(["train", "range", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--start"), "Should show start option");
    assert!(stdout.contains("--end"), "Should show end option");
}

#[test]
fn test_predict_help() {
    let output = neoctl()
        .args(["predict", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--magnitude"));
    assert!(stdout.contains("--diameter-min"));
    assert!(stdout.contains("--diameter-max"));
    assert!(stdout.contains("--velocity"));
}

#[test]
fn test_risk_help() {
    let output = neoctl()
        .args(["risk", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--magnitude"));
    assert!(stdout.contains("--diameter-max"));
    assert!(stdout.contains("--velocity"));
}

#[test]
fn test_format_option() {
    let output = neoctl()
        .args(["--format", "yaml", "models"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unknown format should be rejected");
}

#[test]
fn test_invalid_date_rejected() {
    let output = neoctl()
        .args(["train", "range", "--start", "2024-13-01", "--end", "2024-12-31"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Invalid date should fail to parse");
}

#[test]
fn test_invalid_command() {
    let output = neoctl()
        .arg("invalid-command")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Invalid command should fail");
}

#[test]
fn test_missing_argument() {
    let output = neoctl()
        .args(["train", "range", "--start", "2024-01-01"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Missing --end should fail");
}

#[test]
fn test_unreachable_service_fails() {
    let output = neoctl()
        .args(["--api-url", "http://127.0.0.1:9", "status"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to send request"));
}
