#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn prsm(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("prsm").unwrap();
    cmd.current_dir(dir.path())
        .env("PRSM_ROOT", dir.path())
        .env_remove("RUST_LOG")
        .env_remove("PRSM_DEBUG");
    cmd
}

fn init_project(dir: &TempDir) {
    prsm(dir).args(["init", "--name", "demo"]).assert().success();
}

/// alpha/0.1.x/0.1.1/data-model/{schema,loader}
fn seed(dir: &TempDir) {
    init_project(dir);
    for args in [
        vec!["add", "/", "alpha"],
        vec!["add", "alpha", "0.1.x", "--reason", "first cut"],
        vec!["add", "alpha/0.1.x", "0.1.1"],
        vec!["add", "alpha/0.1.x/0.1.1", "data-model"],
        vec!["add", "alpha/0.1.x/0.1.1/data-model", "schema"],
        vec!["add", "alpha/0.1.x/0.1.1/data-model", "loader"],
    ] {
        prsm(dir).args(&args).assert().success();
    }
}

fn state(dir: &TempDir) -> serde_yaml::Value {
    let data = std::fs::read_to_string(dir.path().join(".prsm/state.yaml")).unwrap();
    serde_yaml::from_str(&data).unwrap()
}

// ---------------------------------------------------------------------------
// prsm init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_state_and_config() {
    let dir = TempDir::new().unwrap();
    prsm(&dir)
        .args(["init", "--name", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized project 'demo'"));

    assert!(dir.path().join(".prsm/state.yaml").exists());
    assert!(dir.path().join(".prsm/config.yaml").exists());
    let doc = state(&dir);
    assert_eq!(doc["schema_version"].as_u64(), Some(2));
    assert_eq!(doc["project"].as_str(), Some("demo"));
}

#[test]
fn init_twice_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    prsm(&dir)
        .arg("init")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn commands_before_init_fail_not_found() {
    let dir = TempDir::new().unwrap();
    prsm(&dir)
        .arg("show")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// structure
// ---------------------------------------------------------------------------

#[test]
fn add_infers_tier_and_show_lists_tree() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"))
        .stdout(predicate::str::contains("0.1.1"))
        .stdout(predicate::str::contains("schema"));

    prsm(&dir)
        .args(["show", "alpha/0.1.x/0.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("block version 0.1.1"));

    let out = prsm(&dir)
        .args(["--json", "show", "alpha/0.1.x"])
        .output()
        .unwrap();
    let node: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(node["level"], "milestone");
    assert_eq!(node["reason"], "first cut");
}

#[test]
fn bad_block_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args(["add", "alpha/0.1.x", "0.1.x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("block version"));
}

#[test]
fn duplicate_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args(["add", "alpha/0.1.x/0.1.1/data-model", "schema"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("duplicate"));
}

#[test]
fn status_propagates_to_ancestors() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let task = "alpha/0.1.x/0.1.1/data-model";
    prsm(&dir)
        .args(["status", &format!("{task}/schema"), "completed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("in_progress"));
    prsm(&dir)
        .args(["status", &format!("{task}/loader"), "done"])
        .assert()
        .success();

    let doc = state(&dir);
    assert_eq!(doc["phases"][0]["status"].as_str(), Some("completed"));
}

#[test]
fn container_status_is_derived() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args(["status", "alpha/0.1.x", "completed"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("derived"));
}

#[test]
fn rm_missing_path_is_not_found() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir).args(["rm", "alpha/9.9.x"]).assert().code(3);
}

#[test]
fn rm_moves_cursor_to_surviving_ancestor() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args(["cd", "alpha/0.1.x/0.1.1/data-model/loader"])
        .assert()
        .success();
    prsm(&dir)
        .args(["rm", "alpha/0.1.x/0.1.1/data-model"])
        .assert()
        .success();
    prsm(&dir)
        .arg("pwd")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("alpha/0.1.x/0.1.1 "));
}

#[test]
fn mv_reparents() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir).args(["add", "alpha/0.1.x", "0.1.2"]).assert().success();
    prsm(&dir)
        .args(["mv", "alpha/0.1.x/0.1.1/data-model", "alpha/0.1.x/0.1.2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha/0.1.x/0.1.2/data-model"));
}

#[test]
fn edit_updates_label() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args([
            "edit",
            "alpha/0.1.x/0.1.1/data-model",
            "--label",
            "Data model",
            "--tag",
            "Core",
        ])
        .assert()
        .success();
    let doc = state(&dir);
    let task = &doc["phases"][0]["children"][0]["children"][0]["children"][0];
    assert_eq!(task["label"].as_str(), Some("Data model"));
    assert_eq!(task["tags"][0].as_str(), Some("core"));
}

// ---------------------------------------------------------------------------
// timer
// ---------------------------------------------------------------------------

#[test]
fn timer_lifecycle() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let schema = "alpha/0.1.x/0.1.1/data-model/schema";
    prsm(&dir).args(["timer", "start", schema]).assert().success();
    prsm(&dir)
        .args(["timer", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running"));
    prsm(&dir).args(["timer", "start", schema]).assert().code(4);
    prsm(&dir).args(["timer", "pause"]).assert().success();
    prsm(&dir).args(["timer", "pause"]).assert().code(2);
    prsm(&dir).args(["timer", "resume"]).assert().success();
    prsm(&dir)
        .args(["timer", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Recorded"));
    prsm(&dir).args(["timer", "stop"]).assert().code(2);

    let doc = state(&dir);
    assert_eq!(doc["timer"]["state"].as_str(), Some("idle"));
    assert_eq!(doc["history"].as_sequence().map(Vec::len), Some(1));
}

#[test]
fn timer_note_is_kept_in_history() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args([
            "timer",
            "start",
            "alpha/0.1.x/0.1.1/data-model/schema",
            "--note",
            "column types",
        ])
        .assert()
        .success();
    prsm(&dir)
        .args(["timer", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("note: column types"));
    prsm(&dir).args(["timer", "stop"]).assert().success();
    prsm(&dir)
        .args(["timer", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("column types"));

    let doc = state(&dir);
    assert_eq!(
        doc["history"][0]["description"].as_str(),
        Some("column types")
    );
}

#[test]
fn oversized_duration_is_a_validation_error() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args([
            "timer",
            "log",
            "alpha/0.1.x/0.1.1/data-model/loader",
            "18446744073709551615h",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid duration"));
}

#[test]
fn timer_start_on_task_is_rejected() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args(["timer", "start", "alpha/0.1.x/0.1.1/data-model"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("subtasks only"));
}

#[test]
fn timer_log_adds_time() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let out = prsm(&dir)
        .args([
            "--json",
            "timer",
            "log",
            "alpha/0.1.x/0.1.1/data-model/loader",
            "1h30m",
        ])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["total_secs"], 5400);

    prsm(&dir)
        .args(["timer", "log", "alpha/0.1.x/0.1.1/data-model", "10m"])
        .assert()
        .code(2);
}

// ---------------------------------------------------------------------------
// cursor
// ---------------------------------------------------------------------------

#[test]
fn navigation_round_trip() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .arg("pwd")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("alpha "));
    prsm(&dir).arg("enter").assert().success();
    prsm(&dir).arg("enter").assert().success();
    prsm(&dir).arg("enter").assert().success();
    prsm(&dir)
        .arg("enter")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("alpha/0.1.x/0.1.1/data-model/schema "));
    prsm(&dir)
        .arg("next")
        .assert()
        .success()
        .stdout(predicate::str::contains("loader"));
    prsm(&dir)
        .arg("next")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("end of the tree"));
    prsm(&dir)
        .arg("up")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("alpha/0.1.x/0.1.1/data-model "));
}

#[test]
fn cd_accepts_relative_paths() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir).args(["cd", "alpha/0.1.x"]).assert().success();
    prsm(&dir)
        .args(["cd", "./0.1.1"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("alpha/0.1.x/0.1.1 "));
    prsm(&dir).args(["cd", "nowhere"]).assert().code(3);
}

// ---------------------------------------------------------------------------
// persistence
// ---------------------------------------------------------------------------

#[test]
fn backup_create_list_restore() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    prsm(&dir)
        .args(["backup", "create", "--name", "snapshot"])
        .assert()
        .success();
    prsm(&dir).args(["rm", "alpha"]).assert().success();
    prsm(&dir)
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot"));
    prsm(&dir)
        .args(["backup", "restore", "snapshot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Previous state saved as"));
    prsm(&dir)
        .args(["show", "alpha/0.1.x/0.1.1/data-model/schema"])
        .assert()
        .success();
}

#[test]
fn held_lock_is_a_concurrency_error() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    let lock = format!(
        "{{\"pid\":{},\"acquired_at\":\"2026-01-01T00:00:00Z\"}}",
        std::process::id()
    );
    std::fs::write(dir.path().join(".prsm/state.lock"), lock).unwrap();
    prsm(&dir)
        .args(["add", "/", "beta"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("locked by process"));
    // reads never take the lock
    prsm(&dir).arg("show").assert().success();
}

#[test]
fn corrupt_state_recovers_with_warning() {
    let dir = TempDir::new().unwrap();
    seed(&dir);
    std::fs::write(dir.path().join(".prsm/state.yaml"), "phases: [ {").unwrap();
    prsm(&dir)
        .arg("show")
        .assert()
        .success()
        .stderr(predicate::str::contains("recovered from backup"))
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn newer_schema_is_unsupported() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".prsm/state.yaml"),
        "schema_version: 42\nproject: demo\n",
    )
    .unwrap();
    prsm(&dir).arg("show").assert().code(7);
}
