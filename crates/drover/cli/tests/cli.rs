use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const DEPLOYMENT: &str = r#"{
  "hosts": [
    { "name": "db1", "tags": ["db"], "labels": { "rack": "a" } },
    { "name": "web1", "targetHost": "10.0.0.5", "tags": ["web"], "labels": { "rack": "a" } },
    { "name": "web2", "tags": ["web"], "labels": { "rack": "b" } }
  ],
  "meta": {
    "ordering": { "tags": ["web"] },
    "constraints": [
      { "selector": { "label": "rack", "value": "*" }, "maxUnavailable": 1 }
    ]
  }
}"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("deployment.json"), DEPLOYMENT).unwrap();
    std::fs::write(dir.path().join("network.nix"), "{}").unwrap();
    dir
}

fn drover(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("drover").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir)
        .env("HOME", dir)
        .env_remove("DROVER_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_plan_lists_hosts_in_ordering_tag_order() {
    let dir = workspace();
    let output = drover(dir.path())
        .args([
            "plan",
            "network.nix",
            "--deployment-json",
            "deployment.json",
            "--output",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = plan["hosts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["web1", "web2", "db1"]);
}

#[test]
fn test_plan_table_shows_slots() {
    let dir = workspace();
    drover(dir.path())
        .args(["plan", "network.nix", "--deployment-json", "deployment.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("web1"))
        .stdout(predicate::str::contains("rack=b"));
}

#[test]
fn test_plan_rejects_unknown_host() {
    let dir = workspace();
    drover(dir.path())
        .args([
            "plan",
            "network.nix",
            "--deployment-json",
            "deployment.json",
            "--on",
            "web1,mail9",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("host mail9 not in deployment"));
}

#[test]
fn test_plan_rejects_empty_selection() {
    let dir = workspace();
    drover(dir.path())
        .args([
            "plan",
            "network.nix",
            "--deployment-json",
            "deployment.json",
            "--tagged",
            "mail",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no hosts selected"));
}

#[test]
fn test_zero_capacity_constraint_is_a_configuration_error() {
    let dir = workspace();
    let broken = DEPLOYMENT.replace("\"maxUnavailable\": 1", "\"maxUnavailable\": 0");
    std::fs::write(dir.path().join("broken.json"), broken).unwrap();

    drover(dir.path())
        .args(["plan", "network.nix", "--deployment-json", "broken.json"])
        .assert()
        .failure();
}

#[test]
fn test_deploy_rejects_unknown_action() {
    let dir = workspace();
    drover(dir.path())
        .args([
            "deploy",
            "network.nix",
            "reinstall",
            "--deployment-json",
            "deployment.json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown action"));
}

#[test]
fn test_config_shows_file_overrides() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("drover.toml"),
        "[ssh]\ndefault_user = \"deploy\"\n",
    )
    .unwrap();

    drover(dir.path())
        .args(["--config", "drover.toml", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_user = \"deploy\""))
        .stdout(predicate::str::contains("build_cmd = \"nix-build\""));
}
