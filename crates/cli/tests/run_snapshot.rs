use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

#[test]
fn test_cli_run_writes_snapshot() {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("wirebench-run-snapshot-{}", nonce));
    std::fs::create_dir_all(&dir).unwrap();

    let circuit = dir.join("circuit.yaml");
    std::fs::write(
        &circuit,
        r#"
name: "oled-demo"
components:
  - id: oled
    type: ssd1306
    config:
      address: "0x3C"
"#,
    )
    .unwrap();

    // JSON is accepted as well as YAML.
    let trace = dir.join("trace.json");
    std::fs::write(
        &trace,
        r#"[
  {"event": "i2c_start"},
  {"event": "i2c_connect", "address": 60},
  {"event": "i2c_write", "value": 0},
  {"event": "i2c_write", "value": 175},
  {"event": "i2c_stop"},
  {"event": "tick", "cycles": 16000}
]"#,
    )
    .unwrap();

    let snapshot_path = dir.join("snapshot.json");
    let output = Command::new(env!("CARGO_BIN_EXE_wirebench"))
        .args([
            "--circuit",
            circuit.to_str().unwrap(),
            "--trace",
            trace.to_str().unwrap(),
            "--no-uart-stdout",
            "--snapshot",
            snapshot_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute wirebench");

    assert!(output.status.success());
    assert!(snapshot_path.exists());

    let snapshot_content = std::fs::read_to_string(&snapshot_path).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&snapshot_content).unwrap();
    assert_eq!(snapshot["oled"]["display_on"], true);
    assert_eq!(snapshot["oled"]["framebuffer"].as_array().unwrap().len(), 1024);
    assert!(snapshot["lcd"].is_null());
    assert_eq!(snapshot["cycles"], 16000);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cli_run_requires_inputs() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirebench"))
        .args(["--trace-log"])
        .output()
        .expect("Failed to execute wirebench");

    assert_eq!(output.status.code(), Some(2));
}
