//! Integration tests for `localpack order`

mod common;

use common::TestProject;
use predicates::prelude::*;

/// Manifest listing each directory as a build-mode dependency
fn manifest(deps: &[&str]) -> String {
    let mut out = String::from("[target]\npath = \"app\"\n");
    for dep in deps {
        out.push_str(&format!("\n[[dependencies]]\npath = \"{dep}\"\n"));
    }
    out
}

#[test]
fn test_order_lists_dependencies_first() {
    let project = TestProject::new();
    project.add_package("app", "app", "0.1.0", &["a"]);
    project.add_package("a", "a", "1.0.0", &["b"]);
    project.add_package("b", "b", "1.0.0", &["c"]);
    project.add_package("c", "c", "1.0.0", &[]);
    project.create_file("localpack.toml", &manifest(&["a", "b", "c"]));

    let output = project.localpack(&["--json", "order"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["target"], "app");
    assert_eq!(json["order"], serde_json::json!(["c", "b", "a"]));
    assert_eq!(json["sync"], serde_json::json!([]));
}

#[test]
fn test_order_quiet_prints_bare_names() {
    let project = TestProject::new();
    project.add_package("app", "app", "0.1.0", &["ui"]);
    project.add_package("ui", "@acme/ui", "1.0.0", &["@acme/tokens"]);
    project.add_package("tokens", "@acme/tokens", "1.0.0", &[]);
    project.create_file("localpack.toml", &manifest(&["ui", "tokens"]));

    let output = project.localpack(&["--quiet", "order"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["@acme/tokens", "@acme/ui"]);
}

#[test]
fn test_order_shows_sync_dependencies_separately() {
    let project = TestProject::new();
    project.add_package("app", "app", "0.1.0", &["a", "theme"]);
    project.add_package("a", "a", "1.0.0", &[]);
    project.add_package("theme", "theme", "1.0.0", &[]);
    project.create_file(
        "localpack.toml",
        &format!("{}\n[[dependencies]]\npath = \"theme\"\nmode = \"sync\"\n", manifest(&["a"])),
    );

    let output = project.localpack(&["order"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(predicate::str::contains("1. a").eval(&stdout));
    assert!(predicate::str::contains("theme (sync)").eval(&stdout));
}

#[test]
fn test_order_rejects_cycle() {
    let project = TestProject::new();
    project.add_package("app", "app", "0.1.0", &["a"]);
    project.add_package("a", "a", "1.0.0", &["b"]);
    project.add_package("b", "b", "1.0.0", &["a"]);
    project.create_file("localpack.toml", &manifest(&["a", "b"]));

    let output = project.localpack(&["order"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Circular dependency detected"),
        "stderr: {stderr}"
    );
}

#[test]
fn test_order_without_manifest_fails() {
    let project = TestProject::new();

    let output = project.localpack(&["order"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("localpack.toml"), "stderr: {stderr}");
}
