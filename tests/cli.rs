//! End-to-end CLI tests over a temporary database.

use assert_cmd::Command;
use tempfile::TempDir;

fn llog(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("llog").unwrap();
    cmd.env("LLOG_DB", dir.path().join("lifelog.db"))
        .env("LLOG_MACHINE", "test-machine")
        .env_remove("LLOG_TEST_DB");
    cmd
}

fn init(dir: &TempDir) {
    llog(dir).args(["init", "--json"]).assert().success();
}

#[test]
fn test_init_then_reinit_fails_without_force() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    llog(&dir).arg("init").assert().failure().code(2);
    llog(&dir).args(["init", "--force"]).assert().success();
}

#[test]
fn test_version_json_output() {
    let dir = TempDir::new().unwrap();
    let output = llog(&dir).args(["version", "--json"]).assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_commands_fail_cleanly_before_init() {
    let dir = TempDir::new().unwrap();
    llog(&dir)
        .args(["entry", "list"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_sync_apply_and_entry_lifecycle() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    let batch = r#"{"entity_type":"entry","scalar_fields":{"title":"First day","body":"Started the journal."}}"#;
    let output = llog(&dir)
        .args(["sync", "apply", "--source", "yaml", "--json"])
        .write_stdin(batch)
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["report"]["synced"], 1);
    assert_eq!(report["report"]["failed"], 0);

    // listed, then soft-deleted, then hidden, then restored
    let output = llog(&dir)
        .args(["entry", "list", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let id = entries[0]["id"].as_i64().unwrap();

    llog(&dir)
        .args([
            "entry",
            "delete",
            &id.to_string(),
            "--reason",
            "test cleanup",
        ])
        .assert()
        .success();

    let output = llog(&dir)
        .args(["entry", "list", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 0);

    llog(&dir)
        .args(["entry", "restore", &id.to_string()])
        .assert()
        .success();

    let output = llog(&dir)
        .args(["entry", "show", &id.to_string(), "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let entry: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(entry["deleted_at"].is_null());
}

#[test]
fn test_sync_apply_rejects_malformed_jsonl() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    llog(&dir)
        .args(["sync", "apply"])
        .write_stdin("not json at all")
        .assert()
        .failure()
        .code(6);
}

#[test]
fn test_entry_show_unknown_id_exits_not_found() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    llog(&dir)
        .args(["entry", "show", "999"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_tombstone_remove_unknown_pair_exits_not_found() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    llog(&dir)
        .args(["tombstone", "remove", "entry_tags", "1", "2"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_sync_status_empty_store() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    let output = llog(&dir)
        .args(["sync", "status", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let status: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["checkpoints"]["total"], 0);
    assert_eq!(status["tombstones"]["total"], 0);
}

#[test]
fn test_conflicts_list_empty() {
    let dir = TempDir::new().unwrap();
    init(&dir);

    let output = llog(&dir)
        .args(["conflicts", "list", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let conflicts: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(conflicts.as_array().unwrap().len(), 0);
}

#[test]
fn test_completions_generate() {
    let dir = TempDir::new().unwrap();
    llog(&dir).args(["completions", "bash"]).assert().success();
}
