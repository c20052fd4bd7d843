#![cfg(feature = "cli")]

use std::process::Command;

fn serlink() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_serlink"));
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn encode_prints_reference_frame() {
    let output = serlink()
        .args(["--format", "json", "encode", "0a32"])
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"frame\":\"0500020a32c204\""), "{stdout}");
    assert!(stdout.contains("\"size\":7"));
}

#[test]
fn encode_raw_writes_wire_bytes() {
    let output = serlink()
        .args(["--format", "raw", "encode", "0x04,0x05,0x06"])
        .output()
        .expect("encode should run");

    assert!(output.status.success());
    assert_eq!(
        output.stdout,
        vec![0x05, 0x00, 0x03, 0x06, 0x0A, 0x06, 0x0B, 0x06, 0x0C, 0xEE, 0x04]
    );
}

#[test]
fn encode_rejects_bad_hex_with_usage_code() {
    let output = serlink()
        .args(["encode", "0a3"])
        .output()
        .expect("encode should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_prints_each_frame() {
    let output = serlink()
        .args([
            "--format",
            "json",
            "decode",
            "ff 05 00 02 0a 32 c2 04 05 00 01 8f 70 04",
        ])
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert!(lines[0].contains("\"command_id\":10"));
    assert!(lines[0].contains("\"parameters\":\"32\""));
    assert!(lines[1].contains("\"command_id\":143"));
    assert!(lines[1].contains("\"valid\":true"));
}

#[test]
fn decode_flags_checksum_mismatch() {
    let output = serlink()
        .args(["--format", "json", "decode", "05 00 02 0a 32 c3 04"])
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(60));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"valid\":false"));
}

#[test]
fn decode_without_frame_is_data_invalid() {
    let output = serlink()
        .args(["decode", "05 00 00 04"])
        .output()
        .expect("decode should run");
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn version_reports_package_version() {
    let output = serlink()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("serlink {}", env!("CARGO_PKG_VERSION"))
    );
}
