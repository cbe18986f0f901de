//! CLI integration tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use edgemanage_lib::ReconcileLock;
use tempfile::TempDir;

/// Temp layout with a config file pointing into it
struct Workspace {
    dir: TempDir,
    config_path: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("health")).unwrap();
        std::fs::create_dir(dir.path().join("edges")).unwrap();

        let config_path = dir.path().join("edgemanage.yaml");
        let root = dir.path().display();
        std::fs::write(
            &config_path,
            format!(
                "healthdata_store: {root}/health\n\
                 edgelist_dir: {root}/edges\n\
                 lockfile: {root}/edgemanage.lock\n\
                 prometheus_logs: {root}/edgemanage.prom\n\
                 goodenough: 0.5\n"
            ),
        )
        .unwrap();

        Self { dir, config_path }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_edgemanage"))
            .arg("--config")
            .arg(&self.config_path)
            .args(args)
            .env("RUST_LOG", "warn")
            .output()
            .expect("Failed to execute edgemanage")
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "{:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn write_mapping(path: &Path, json: &str) {
    std::fs::write(path, json).unwrap();
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_edgemanage"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("record"), "Should show record command");
    assert!(stdout.contains("classify"), "Should show classify command");
    assert!(stdout.contains("segments"), "Should show segments command");
    assert!(stdout.contains("apply"), "Should show apply command");
}

#[test]
fn test_record_then_classify() {
    let ws = Workspace::new();

    assert!(ws.run(&["record", "edge1.example.net", "0.1"]).status.success());
    assert!(ws.run(&["record", "edge2.example.net", "0.1"]).status.success());
    assert!(ws
        .run(&["record", "edge2.example.net", "timeout"])
        .status
        .success());

    let report = ws.run_json(&["classify", "edge1.example.net", "edge2.example.net"]);

    assert_eq!(report["verdicts"]["edge1.example.net"], "pass_threshold");
    assert_eq!(report["verdicts"]["edge2.example.net"], "fail");
    assert_eq!(report["counts"]["pass_threshold"], 1);
    assert_eq!(report["counts"]["fail"], 1);
    assert_eq!(report["edges_disabled"], false);

    let prom = std::fs::read_to_string(ws.path("edgemanage.prom")).unwrap();
    assert!(prom.contains("edgemanage_reachable_status{edge=\"edge2.example.net\"} 0"));
}

#[test]
fn test_record_rejects_bad_value() {
    let ws = Workspace::new();

    let output = ws.run(&["record", "edge1.example.net", "slow"]);
    assert!(!output.status.success());
    let output = ws.run(&["record", "edge1.example.net", "0.1", "--timestamp", "NaN"]);
    assert!(!output.status.success());
    assert!(!ws.path("health/edge1.example.net.edgestore").exists());

    let output = ws.run(&["record", "../escaped", "0.1"]);
    assert!(!output.status.success());
    assert!(!ws.path("escaped.edgestore").exists());
}

#[test]
fn test_apply_then_list_segments() {
    let ws = Workspace::new();
    std::fs::write(ws.path("edges/dnet-old"), "edge9\n").unwrap();
    let mapping = ws.path("mapping.json");
    write_mapping(
        &mapping,
        r#"{"dnet-a": ["edge1", "edge2"], "dnet-b": ["edge3"]}"#,
    );

    let outcome = ws.run_json(&["apply", mapping.to_str().unwrap()]);
    assert_eq!(outcome["created"], serde_json::json!(["dnet-a", "dnet-b"]));
    assert_eq!(outcome["deleted"], serde_json::json!(["dnet-old"]));
    assert_eq!(outcome["errors"], serde_json::json!([]));

    let listed = ws.run_json(&["segments"]);
    assert_eq!(listed, serde_json::json!(["dnet-a", "dnet-b"]));

    let report = ws.run_json(&["classify", "--dnet", "dnet-b"]);
    // No samples recorded for edge3 yet
    assert_eq!(report["verdicts"]["edge3"], "fail");
}

#[test]
fn test_apply_fails_fast_when_locked() {
    let ws = Workspace::new();
    let mapping = ws.path("mapping.json");
    write_mapping(&mapping, r#"{"dnet-a": ["edge1"]}"#);

    let _held = ReconcileLock::try_acquire(ws.path("edgemanage.lock")).unwrap();
    let output = ws.run(&["apply", mapping.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("lockfile"), "stderr: {}", stderr);
    assert!(!ws.path("edges/dnet-a").exists());
}
