//! E2E CLI tests: import a captured feed, then read it back through
//! `messages`, `history`, `blame`, and `verify`.
//!
//! Each test runs the `chorus` binary as a subprocess in an isolated temp
//! directory.

use std::path::Path;

use assert_cmd::Command;
use chorus_core::commit::{Commit, CommitEvent, create};
use chorus_core::engine::DocId;
use chorus_core::payload::Payload;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn chorus_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("chorus"));
    cmd.current_dir(dir);
    cmd.env("CHORUS_USER", "tester");
    cmd.env("CHORUS_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd
}

fn envelope(doc: &str, commit: &Commit) -> String {
    CommitEvent::CommitAdded {
        doc_id: DocId::new(doc),
        commit: commit.clone(),
    }
    .to_json()
}

/// A feed with two chat messages and three document revisions by two
/// authors, plus one undecodable line.
fn feed() -> String {
    let v1 = create(&Payload::document("alice", "hello", 1_000).encode(), vec![]);
    let v2 = create(
        &Payload::document("bob", "hello world", 2_000).encode(),
        vec![v1.hash.clone()],
    );
    let v3 = create(
        &Payload::document("alice", "hello world!", 3_000).encode(),
        vec![v2.hash.clone()],
    );
    let m1 = create(&Payload::message("alice", "hi bob", 1_500).encode(), vec![]);
    let m2 = create(&Payload::message("bob", "hey", 2_500).encode(), vec![]);

    let batch = CommitEvent::for_batch(DocId::new("doc-1"), vec![v3, m2]).to_json();
    [
        r#"{"type":"docCreated","id":"doc-1"}"#.to_owned(),
        envelope("doc-1", &v1),
        envelope("doc-1", &m1),
        envelope("doc-1", &v2),
        "not json".to_owned(),
        batch,
    ]
    .join("\n")
}

fn imported_project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("feed.jsonl");
    std::fs::write(&path, feed()).expect("write feed");
    chorus_cmd(dir.path())
        .args(["import", "--input", "feed.jsonl", "--name", "general"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 undecodable lines skipped"));
    dir
}

fn json_of(dir: &Path, args: &[&str]) -> Value {
    let output = chorus_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

#[test]
fn import_is_idempotent() {
    let dir = imported_project();
    let again = chorus_cmd(dir.path())
        .args(["import", "--input", "feed.jsonl", "--json"])
        .output()
        .expect("reimport");
    assert!(again.status.success());
    let report: Value = serde_json::from_slice(&again.stdout).expect("json");
    let channel = &report["channels"][0];
    assert_eq!(channel["messages"], 0);
    assert_eq!(channel["documents"], 0);
    assert_eq!(channel["commits"], 5);
}

#[test]
fn mixed_batch_keeps_the_decodable_commits() {
    let dir = TempDir::new().expect("tempdir");
    let m1 = create(&Payload::message("alice", "first", 1_000).encode(), vec![]);
    let m2 = create(&Payload::message("bob", "second", 2_000).encode(), vec![]);
    let batch = CommitEvent::for_batch(DocId::new("doc-1"), vec![m1, m2]).to_json();
    let head = batch.strip_suffix("]}").expect("commits last");
    let line = format!(r#"{head},{{"parents":[],"hash":"nothex","contents":"aGk="}}]}}"#);

    let report: Value = {
        let output = chorus_cmd(dir.path())
            .args(["import", "--json"])
            .write_stdin(line)
            .output()
            .expect("import");
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).expect("json")
    };
    assert_eq!(report["undecodable_lines"], 0);
    assert_eq!(report["channels"][0]["messages"], 2);
    assert_eq!(report["channels"][0]["undecodable"], 1);

    let messages = json_of(dir.path(), &["messages", "doc-1"]);
    assert_eq!(messages.as_array().expect("array").len(), 2);
}

#[test]
fn import_reads_stdin() {
    let dir = TempDir::new().expect("tempdir");
    chorus_cmd(dir.path())
        .arg("import")
        .write_stdin(feed())
        .assert()
        .success();
    chorus_cmd(dir.path())
        .args(["messages", "doc-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice: hi bob"));
}

#[test]
fn messages_are_ordered_by_timestamp() {
    let dir = imported_project();
    let messages = json_of(dir.path(), &["messages", "doc-1"]);
    let users: Vec<&str> = messages
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|m| m["user"].as_str())
        .collect();
    assert_eq!(users, ["alice", "bob"]);
}

#[test]
fn history_lists_revisions_and_filters_by_time() {
    let dir = imported_project();
    let all = json_of(dir.path(), &["history", "doc-1"]);
    assert_eq!(all.as_array().map(Vec::len), Some(3));
    assert_eq!(all[2]["content"], "hello world!");

    let window = json_of(
        dir.path(),
        &["history", "doc-1", "--from", "1970-01-01T00:00:01.500Z"],
    );
    let window = window.as_array().expect("array");
    assert_eq!(window.len(), 2);
    assert_eq!(window[0]["index"], 1);
    assert_eq!(window[0]["user"], "bob");
}

#[test]
fn blame_attributes_each_author() {
    let dir = imported_project();
    let live = json_of(dir.path(), &["blame", "doc-1"]);
    assert_eq!(live["content"], "hello world!");
    assert_eq!(live["authors"], serde_json::json!(["alice", "bob"]));

    let segments = live["lines"][0]["segments"].as_array().expect("segments");
    let texts: Vec<(&str, &str)> = segments
        .iter()
        .filter_map(|s| Some((s["author"].as_str()?, s["text"].as_str()?)))
        .collect();
    assert_eq!(
        texts,
        [("alice", "hello"), ("bob", " world"), ("alice", "!")]
    );

    let first = json_of(dir.path(), &["blame", "doc-1", "--at", "0"]);
    assert_eq!(first["index"], 0);
    assert_eq!(first["content"], "hello");
}

#[test]
fn blame_out_of_range_reports_code() {
    let dir = imported_project();
    chorus_cmd(dir.path())
        .args(["blame", "doc-1", "--at", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E"));
}

#[test]
fn unknown_channel_fails_with_hint() {
    let dir = imported_project();
    let output = chorus_cmd(dir.path())
        .args(["messages", "nope", "--json"])
        .output()
        .expect("run");
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("json error");
    assert!(err["error"]["error_code"].is_string());
}

#[test]
fn reading_before_import_is_not_initialized() {
    let dir = TempDir::new().expect("tempdir");
    chorus_cmd(dir.path())
        .args(["messages", "doc-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no store"));
}

#[test]
fn verify_passes_after_import() {
    let dir = imported_project();
    chorus_cmd(dir.path())
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("OK   schema"))
        .stdout(predicate::str::contains("verify: success"));
}
