//! Startup validation of the daemon binary.

use std::process::Command;

fn upteed() -> Command {
    Command::new(env!("CARGO_BIN_EXE_upteed"))
}

#[test]
fn missing_root_exits_nonzero_with_usage_hint() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent");
    let out = upteed()
        .args(["--root", missing.to_str().unwrap(), "--port", "0"])
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("root directory does not exist"), "{stderr}");
    assert!(stderr.contains("Try --help for usage details."), "{stderr}");
}

#[test]
fn bad_webhook_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let out = upteed()
        .args([
            "--root",
            dir.path().to_str().unwrap(),
            "--webhook",
            "ftp://sink.example/ingest",
        ])
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid webhook URL"));
}

#[test]
fn bad_passive_range_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let out = upteed()
        .args([
            "--root",
            dir.path().to_str().unwrap(),
            "--passive-ports",
            "50010-50000",
        ])
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid passive port range"));
}

#[test]
fn unknown_flag_is_a_clap_error() {
    let out = upteed().arg("--no-such-flag").output().unwrap();
    assert_eq!(out.status.code(), Some(2));
}
