use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::Utc;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use pressroom_core::{settings, CommitSha, DeploymentRecord, DeploymentStatus, HistoryStore};

fn pressroom_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pressroom"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1");
    cmd
}

fn seed_history(home: &Path) {
    let now = Utc::now();
    let mut record =
        DeploymentRecord::pending(CommitSha::from("abc1234def"), "Create post: hi.md", None, now);
    record.settle(DeploymentStatus::Completed, now);
    HistoryStore::at(home, 50).append(record).expect("seed history");
}

#[test]
fn status_without_daemon_says_so() {
    let home = TempDir::new().expect("home");
    pressroom_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("daemon is not running"));

    pressroom_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(contains("\"running\":false"));
}

#[test]
fn daemon_status_reports_not_running() {
    let home = TempDir::new().expect("home");
    let output = pressroom_cmd(home.path())
        .args(["daemon", "status"])
        .output()
        .expect("run daemon status");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["running"], serde_json::Value::Bool(false));
}

#[test]
fn track_requires_a_running_daemon() {
    let home = TempDir::new().expect("home");
    pressroom_cmd(home.path())
        .args(["track", "abc1234", "--action", "Create post: a.md"])
        .assert()
        .failure()
        .stderr(contains("daemon is not running"));
}

#[test]
fn offline_history_uses_local_records() {
    let home = TempDir::new().expect("home");
    seed_history(home.path());

    pressroom_cmd(home.path())
        .arg("history")
        .assert()
        .success()
        .stdout(contains("0 publishing, 1 in history (CI not configured)"))
        .stdout(contains("abc1234"));

    let output = pressroom_cmd(home.path())
        .args(["history", "--json"])
        .output()
        .expect("run history --json");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["source"], "offline");
    assert_eq!(value["remote"]["state"], "not_configured");
    assert_eq!(value["history"][0]["status"], "completed");
    assert!(value.get("superseded").is_none());
}

#[test]
fn superseded_runs_are_hidden_unless_requested() {
    let home = TempDir::new().expect("home");
    let now = Utc::now();
    let mut skipped =
        DeploymentRecord::pending(CommitSha::from("5k1pped00"), "Update page: a.md", None, now);
    skipped.settle(DeploymentStatus::Skipped, now);
    HistoryStore::at(home.path(), 50)
        .append(skipped)
        .expect("seed history");

    let output = pressroom_cmd(home.path())
        .args(["history", "--json", "--show-superseded"])
        .output()
        .expect("run history");
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["history"].as_array().unwrap().len(), 0);
    assert_eq!(value["superseded"][0]["status"], "skipped");
}

#[test]
fn config_set_without_daemon_edits_the_file() {
    let home = TempDir::new().expect("home");
    pressroom_cmd(home.path())
        .args(["config", "set", "poll_interval_secs", "30"])
        .assert()
        .success()
        .stdout(contains("set poll_interval_secs = 30"));
    assert_eq!(
        settings::load_at(home.path())
            .expect("load settings")
            .poll_interval_secs,
        30
    );

    pressroom_cmd(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("poll_interval_secs"))
        .stdout(contains("30"));
}

#[test]
fn config_rejects_unknown_and_invalid_values() {
    let home = TempDir::new().expect("home");
    pressroom_cmd(home.path())
        .args(["config", "set", "bogus", "1"])
        .assert()
        .failure()
        .stderr(contains("unknown setting"));

    pressroom_cmd(home.path())
        .args(["config", "set", "deployment_timeout_secs", "0"])
        .assert()
        .failure();
}

#[test]
fn config_show_masks_the_token() {
    let home = TempDir::new().expect("home");
    pressroom_cmd(home.path())
        .args(["config", "set", "remote.token", "s3cret"])
        .assert()
        .success();
    pressroom_cmd(home.path())
        .args(["config", "show", "--json"])
        .assert()
        .success()
        .stdout(contains("********"))
        .stdout(contains("s3cret").not());
}
