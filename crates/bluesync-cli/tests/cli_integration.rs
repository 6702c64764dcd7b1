//! CLI Integration Tests
//!
//! These tests run the `bluesync` binary against temporary scripts and
//! config files.
//!
//! ```
//! cargo test --package bluesync-cli --test cli_integration
//! ```

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

const PAIRING: &str = r#"# pair and connect a headset
{"kind":"adapter_state_changed","state":"on"}
{"kind":"service_connected","profile":"a2dp"}
{"kind":"service_connected","profile":"headset"}
{"kind":"device_found","address":"aa:bb:cc:dd:ee:ff","name":"Headset","rssi":-40}
{"kind":"bond_state_changed","address":"aa:bb:cc:dd:ee:ff","state":"bonding"}
{"kind":"bond_state_changed","address":"aa:bb:cc:dd:ee:ff","state":"bonded"}
{"kind":"profile_connection_state_changed","address":"aa:bb:cc:dd:ee:ff","profile":"a2dp","state":"connected"}
"#;

/// Run the binary with a config path that never exists on the test host
fn run_bluesync(args: &[&str], config_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bluesync"))
        .args(args)
        .env("BLUESYNC_CONFIG", config_dir.join("config.toml"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run bluesync binary")
}

fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path.to_string_lossy().into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bluesync(&["--help"], dir.path());
    assert!(output.status.success());

    let text = stdout(&output);
    for command in ["replay", "check", "profiles", "config"] {
        assert!(text.contains(command), "help should mention {}", command);
    }
}

#[test]
fn test_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bluesync(&["--version"], dir.path());
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("bluesync "));
}

#[test]
fn test_no_color_accepts_conventional_values() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "");

    for value in ["1", "yes", "0", ""] {
        let output = Command::new(env!("CARGO_BIN_EXE_bluesync"))
            .args(["profiles"])
            .env("BLUESYNC_CONFIG", dir.path().join("config.toml"))
            .env("NO_COLOR", value)
            .env_remove("RUST_LOG")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "NO_COLOR={:?}: {}",
            value,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();

    let init = run_bluesync(&["config", "init"], dir.path());
    assert!(init.status.success(), "{}", String::from_utf8_lossy(&init.stderr));
    assert!(dir.path().join("config.toml").exists());

    let again = run_bluesync(&["config", "init"], dir.path());
    assert!(!again.status.success());

    let show = run_bluesync(&["config", "show"], dir.path());
    assert!(show.status.success());
    assert!(stdout(&show).contains("[manager]"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_bluesync(&["profiles"], dir.path());
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config file not found"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "[manager]\nquery_timeout_ms = 0\n");

    let output = run_bluesync(&["profiles"], dir.path());
    assert!(!output.status.success());
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn test_profiles_json() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "");

    let output = run_bluesync(&["profiles", "--format", "json"], dir.path());
    assert!(output.status.success());

    let profiles: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let profiles = profiles.as_array().unwrap();
    assert_eq!(profiles.len(), 8);
    assert_eq!(profiles[0]["id"], "headset");
}

#[test]
fn test_check_counts_events() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "");
    let script = write_file(dir.path(), "pairing.jsonl", PAIRING);

    let output = run_bluesync(&["check", &script, "--format", "json"], dir.path());
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(summary["events"], 7);
    assert_eq!(summary["devices"], 1);
    assert_eq!(summary["kinds"]["bond_state_changed"], 2);
}

#[test]
fn test_replay_text() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "");
    let script = write_file(dir.path(), "pairing.jsonl", PAIRING);

    let output = run_bluesync(&["replay", &script], dir.path());
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = stdout(&output);
    assert!(text.contains("AA:BB:CC:DD:EE:FF added (Headset)"));
    assert!(text.contains("AA:BB:CC:DD:EE:FF bond bonded"));
    assert!(text.contains("ADDRESS"));
}

#[test]
fn test_replay_json_with_queries() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "format = \"json\"\n");
    let script = write_file(dir.path(), "pairing.jsonl", PAIRING);

    let output = run_bluesync(
        &[
            "replay",
            &script,
            "--prefer",
            "AA:BB:CC:DD:EE:FF",
            "--query",
            "AA:BB:CC:DD:EE:FF",
            "--stats",
        ],
        dir.path(),
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["events"], 7);
    assert_eq!(report["devices"][0]["bond_state"], "bonded");
    assert_eq!(report["queries"][0]["all_preferred"], true);
    assert!(report["stats"]["events_handled"].as_u64().unwrap() >= 7);
}

#[test]
fn test_replay_output_file() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "");
    let script = write_file(dir.path(), "pairing.jsonl", PAIRING);
    let out = dir.path().join("devices.txt");

    let output = run_bluesync(
        &[
            "replay",
            &script,
            "--devices-only",
            "--output",
            out.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
    assert!(std::fs::read_to_string(out).unwrap().starts_with("ADDRESS"));
}

#[test]
fn test_replay_malformed_script_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "config.toml", "");
    let script = write_file(dir.path(), "bad.jsonl", "{\"kind\":\"device_found\"}\nnope\n");

    let output = run_bluesync(&["replay", &script], dir.path());
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 2"));
}
