use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const CIRCUIT: &str = r#"
name: "blink-and-print"
components:
  - id: led_builtin
    type: led
    pin: 13
  - id: led_aux
    type: led
    pin: 2
  - id: lcd
    type: lcd1602
"#;

/// Port B bit 5 high, a few UART bytes, then a tick.
const TRACE: &str = r#"
- event: port
  port: B
  value: 0x20
  cycles: 1600
- event: uart
  value: 79
- event: uart
  value: 75
- event: tick
  cycles: 3200
"#;

fn temp_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("wirebench-tests-{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

fn write_inputs(dir: &PathBuf, assertions: &str) -> PathBuf {
    std::fs::write(dir.join("circuit.yaml"), CIRCUIT).expect("Failed to write circuit");
    std::fs::write(dir.join("trace.yaml"), TRACE).expect("Failed to write trace");
    let script = dir.join("script.yaml");
    std::fs::write(
        &script,
        format!(
            r#"
schema_version: "1.0"
inputs:
  circuit: "circuit.yaml"
  trace: "trace.yaml"
assertions:
{}
"#,
            assertions
        ),
    )
    .expect("Failed to write script");
    script
}

#[test]
fn test_cli_test_mode_outputs() {
    let dir = temp_dir("outputs");
    let script = write_inputs(
        &dir,
        r#"  - uart_contains: "OK"
  - led_on: led_builtin
  - led_on: led_aux
    expected: false"#,
    );
    let output_dir = dir.join("artifacts");

    let output = Command::new(env!("CARGO_BIN_EXE_wirebench"))
        .args([
            "test",
            "--script",
            script.to_str().unwrap(),
            "--no-uart-stdout",
            "--output-dir",
            output_dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());

    let result_content = std::fs::read_to_string(output_dir.join("result.json")).unwrap();
    let result: serde_json::Value = serde_json::from_str(&result_content).unwrap();
    assert_eq!(result["status"], "pass");
    assert_eq!(result["events"], 4);
    assert_eq!(result["cycles"], 3200);
    assert_eq!(result["trace_sha256"].as_str().unwrap().len(), 64);
    assert!(result["failures"].as_array().unwrap().is_empty());
    assert!(result["circuit"].as_str().unwrap().contains("circuit.yaml"));

    let snapshot_content = std::fs::read_to_string(output_dir.join("snapshot.json")).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&snapshot_content).unwrap();
    assert_eq!(snapshot["uart"], "OK");
    assert_eq!(snapshot["time_ns"], 200_000);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_assertion_fail() {
    let dir = temp_dir("assert-fail");
    let script = write_inputs(
        &dir,
        r#"  - uart_contains: "ThisTextWillNeverBeFound"
  - lcd_contains: "Hello""#,
    );
    let output_dir = dir.join("artifacts");

    let output = Command::new(env!("CARGO_BIN_EXE_wirebench"))
        .args([
            "test",
            "--script",
            script.to_str().unwrap(),
            "--no-uart-stdout",
            "--output-dir",
            output_dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1)); // EXIT_ASSERT_FAIL

    let result_content = std::fs::read_to_string(output_dir.join("result.json")).unwrap();
    let result: serde_json::Value = serde_json::from_str(&result_content).unwrap();
    assert_eq!(result["status"], "fail");
    assert_eq!(result["failures"].as_array().unwrap().len(), 2);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_bad_schema_version() {
    let dir = temp_dir("bad-schema");
    let script = dir.join("script.yaml");
    std::fs::write(
        &script,
        r#"
schema_version: "2.0"
inputs:
  circuit: "circuit.yaml"
  trace: "trace.yaml"
"#,
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_wirebench"))
        .args(["test", "--script", script.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2)); // EXIT_CONFIG_ERROR

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_test_mode_pin_conflict() {
    let dir = temp_dir("conflict");
    std::fs::write(
        dir.join("circuit.yaml"),
        r#"
name: "clash"
components:
  - id: a
    type: led
    pin: 13
  - id: b
    type: buzzer
    pin: 13
"#,
    )
    .unwrap();
    std::fs::write(dir.join("trace.yaml"), TRACE).unwrap();
    let script = dir.join("script.yaml");
    std::fs::write(
        &script,
        r#"
schema_version: "1.0"
inputs:
  circuit: "circuit.yaml"
  trace: "trace.yaml"
"#,
    )
    .unwrap();
    let output_dir = dir.join("artifacts");

    let output = Command::new(env!("CARGO_BIN_EXE_wirebench"))
        .args([
            "test",
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            output_dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(2));
    let result_content = std::fs::read_to_string(output_dir.join("result.json")).unwrap();
    let result: serde_json::Value = serde_json::from_str(&result_content).unwrap();
    assert_eq!(result["status"], "error");
    assert!(result["failures"][0]
        .as_str()
        .unwrap()
        .contains("claimed by both"));

    let _ = std::fs::remove_dir_all(&dir);
}
