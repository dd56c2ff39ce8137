#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

//! CLI smoke tests.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;

/// sysexits EX_CONFIG
const EXIT_CONFIG: i32 = 78;
/// sysexits EX_UNAVAILABLE
const EXIT_UNAVAILABLE: i32 = 69;

struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tvrec"));
        cmd.env_remove("TVREC_CONFIG")
            .env_remove("TVREC_STORE")
            .env_remove("TVREC_LOG")
            .env("TVREC_HOSTNAME", "smoke-host");
        cmd
    }

    fn run(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert()
    }

    /// Writes a store with one file-backed MPEG card and one channel.
    fn write_store(&self) -> PathBuf {
        let source = self.path("source.ts");
        std::fs::write(&source, vec![0x47u8; 188 * 64 * 4]).unwrap();
        let store = self.path("store.json");
        let doc = json!({
            "devices": [{
                "cardid": 1,
                "card_type": "MPEG",
                "video_device": format!("file:{}", source.display()),
            }],
            "inputs": [{ "cardid": 1, "name": "Television", "sourceid": 1 }],
            "channels": [{
                "chanid": "1003",
                "channum": "3",
                "callsign": "WXYZ",
                "sourceid": 1,
            }],
        });
        std::fs::write(&store, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
        store
    }

    fn write_settings(&self) -> PathBuf {
        let recordings = self.path("recordings");
        let live = self.path("live");
        let settings = self.path("settings.json");
        let doc = json!({
            "record_file_prefix": recordings,
            "live_buffer_dir": live,
            "live_buffer_gb": 1,
            "poll_interval_ms": 50,
        });
        std::fs::write(&settings, serde_json::to_vec(&doc).unwrap()).unwrap();
        settings
    }
}

fn stdout_json(assert: &assert_cmd::assert::Assert) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    serde_json::from_str(&stdout).expect("valid JSON output")
}

#[test]
fn smoke_settings_prints_json() {
    let env = TestEnv::new();
    let assert = env.run(&["settings"]).success();
    let json = stdout_json(&assert);
    assert_eq!(json["hostname"], "smoke-host");
    assert!(json["state_change_timeout_ms"].is_u64());
}

#[test]
fn smoke_settings_file_is_applied() {
    let env = TestEnv::new();
    let settings = env.write_settings();
    let assert = env
        .run(&["settings", "--config", settings.to_str().unwrap()])
        .success();
    let json = stdout_json(&assert);
    assert_eq!(json["poll_interval_ms"], 50);
}

#[test]
fn smoke_missing_settings_file_is_config_error() {
    let env = TestEnv::new();
    let missing = env.path("absent.json");
    env.run(&["settings", "--config", missing.to_str().unwrap()])
        .code(EXIT_CONFIG)
        .stderr(predicate::str::contains("tvrec: Error:"))
        .stderr(predicate::str::contains("Suggestion:"));
}

#[test]
fn smoke_exec_passes_exit_code_and_output() {
    let env = TestEnv::new();
    env.run(&["exec", "--", "sh", "-c", "echo hello; echo oops >&2; exit 7"])
        .code(7)
        .stdout("hello\n")
        .stderr(predicate::str::contains("oops"));
}

#[test]
fn smoke_exec_missing_program_is_127() {
    let env = TestEnv::new();
    env.run(&["exec", "--", "/nonexistent/tvrec-helper"])
        .code(127);
}

#[test]
fn smoke_exec_timeout_is_124() {
    let env = TestEnv::new();
    env.run(&["exec", "--timeout", "1", "--", "sleep", "30"])
        .code(124);
}

#[test]
fn smoke_record_writes_file() {
    let env = TestEnv::new();
    let store = env.write_store();
    let settings = env.write_settings();
    let assert = env
        .run(&[
            "record",
            "--config",
            settings.to_str().unwrap(),
            "--store",
            store.to_str().unwrap(),
            "--card",
            "1",
            "--chanid",
            "1003",
            "--duration",
            "1",
        ])
        .success();
    let json = stdout_json(&assert);
    assert_eq!(json["cardid"], 1);
    assert_eq!(json["chanid"], "1003");
    assert_eq!(json["stopped_early"], false);
    let path = PathBuf::from(json["path"].as_str().unwrap());
    assert!(path.starts_with(env.path("recordings")));
    assert!(Path::new(&path).exists());
}

#[test]
fn smoke_record_unknown_channel() {
    let env = TestEnv::new();
    let store = env.write_store();
    env.run(&[
        "record",
        "--store",
        store.to_str().unwrap(),
        "--card",
        "1",
        "--chanid",
        "9999",
    ])
    .code(EXIT_UNAVAILABLE)
    .stderr(predicate::str::contains("9999"));
}

#[test]
fn smoke_missing_store_is_unavailable() {
    let env = TestEnv::new();
    let missing = env.path("no-store.json");
    env.run(&[
        "record",
        "--store",
        missing.to_str().unwrap(),
        "--card",
        "1",
        "--chanid",
        "1003",
    ])
    .code(EXIT_UNAVAILABLE)
    .stderr(predicate::str::contains("Suggestion:"));
}

#[test]
fn smoke_live_reports_ring_buffer() {
    let env = TestEnv::new();
    let store = env.write_store();
    let settings = env.write_settings();
    let assert = env
        .run(&[
            "live",
            "--config",
            settings.to_str().unwrap(),
            "--store",
            store.to_str().unwrap(),
            "--card",
            "1",
            "--seconds",
            "1",
        ])
        .success();
    let json = stdout_json(&assert);
    assert_eq!(json["cardid"], 1);
    let ring = PathBuf::from(json["ring_buffer"]["path"].as_str().unwrap());
    assert!(ring.starts_with(env.path("live")));
}
