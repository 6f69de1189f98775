//! Integration tests for the `moorhen` binary.

use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "moorhen-cli", "--bin", "moorhen", "--"]);
    cmd
}

#[test]
fn test_version_json_is_valid_json() {
    let output = cargo_bin()
        .args(["--json", "version"])
        .output()
        .expect("Failed to run moorhen version");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(stdout.trim())
        .unwrap_or_else(|_| panic!("stdout should be valid JSON: {stdout}"));
    assert_eq!(json["name"], "moorhen");
}

#[test]
fn test_link_fails_on_missing_graph() {
    let dir = tempdir().unwrap();

    let output = cargo_bin()
        .args(["link", "no-such-graph.json", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run moorhen link");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no-such-graph.json"),
        "error should name the graph file. stderr: {stderr}"
    );
}

#[test]
fn test_link_empty_graph_succeeds() {
    let dir = tempdir().unwrap();
    let graph = dir.path().join("graph.json");
    fs::write(
        &graph,
        r#"{"manifests":[],"refs":[],"requests":[],"patterns":{},"seed_patterns":[]}"#,
    )
    .unwrap();

    let output = cargo_bin()
        .arg("link")
        .arg(&graph)
        .arg("--cwd")
        .arg(dir.path())
        .output()
        .expect("Failed to run moorhen link");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "link should succeed: {stderr}");
}
