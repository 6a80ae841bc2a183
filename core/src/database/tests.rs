use std::fs;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::embedding::HashEmbedding;
use crate::filter::WhereFilter;
use crate::telemetry::{OperationStatus, LOG_FILE_NAME, STATS_FILE_NAME};

use super::*;

fn metadata(value: Value) -> Metadata {
    value.as_object().cloned().expect("metadata must be an object")
}

fn log_lines(dir: &std::path::Path) -> Vec<Value> {
    fs::read_to_string(dir.join(LOG_FILE_NAME))
        .expect("log must exist")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line must be json"))
        .collect()
}

fn seeded(database: &mut VectorDatabase) {
    database
        .create_collection("docs", Some(metadata(json!({"topic": "fruit"}))))
        .expect("create must succeed");
    database
        .add(
            "docs",
            AddRequest::new(["a", "b", "c"])
                .embeddings(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.8, 0.2]])
                .documents(["apple", "banana", "cherry"]),
        )
        .expect("add must succeed");
}

#[test]
fn operations_are_logged_with_counts_not_payloads() {
    let dir = tempfile::tempdir().expect("temp dir must be creatable");
    let telemetry_dir = dir.path().join("telemetry");
    let mut database = VectorDatabase::open(
        DatabaseConfig::in_memory().with_telemetry_dir(&telemetry_dir),
        None,
    )
    .expect("open must succeed");
    seeded(&mut database);
    database
        .query("docs", QueryRequest::embeddings(vec![vec![1.0, 0.0]]).n_results(2))
        .expect("query must succeed");

    let lines = log_lines(&telemetry_dir);
    let operations: Vec<&str> = lines
        .iter()
        .map(|line| line["operation"].as_str().expect("operation is a string"))
        .collect();
    assert_eq!(operations, vec!["initialize", "create_collection", "add", "query"]);

    let add = &lines[2];
    assert_eq!(add["status"], "success");
    assert_eq!(add["collection"], "docs");
    assert_eq!(add["details"]["ids_count"], 3);
    assert_eq!(add["details"]["added_count"], 3);
    assert_eq!(add["details"]["embeddings_provided"], true);
    assert_eq!(add["details"]["metadatas_provided"], false);
    assert!(!add.to_string().contains("banana"));

    let query = &lines[3];
    assert_eq!(query["details"]["query_count"], 1);
    assert_eq!(query["details"]["returned_count"], 2);
    assert_eq!(lines[1]["details"]["has_metadata"], true);
}

#[test]
fn failed_operations_are_logged_and_returned_unchanged() {
    let dir = tempfile::tempdir().expect("temp dir must be creatable");
    let mut database = VectorDatabase::open(
        DatabaseConfig::in_memory().with_telemetry_dir(dir.path()),
        None,
    )
    .expect("open must succeed");
    seeded(&mut database);
    let before = database.stats();

    let error = database
        .delete("docs", DeleteRequest::default())
        .expect_err("delete without selector must fail");
    assert!(error.is_validation());

    let last = log_lines(dir.path()).pop().expect("log must have lines");
    assert_eq!(last["operation"], "delete");
    assert_eq!(last["status"], "error");
    assert_eq!(last["error"], error.to_string());
    assert!(last["details"].get("deleted_count").is_none());
    assert_eq!(database.stats(), before);
}

#[test]
fn mutations_refresh_stats_and_reads_only_note_the_operation() {
    let mut database = VectorDatabase::in_memory(None).expect("open must succeed");
    seeded(&mut database);
    let stats = database.stats();
    assert_eq!(stats.total_collections, 1);
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.last_operation.as_deref(), Some("add"));

    database
        .delete("docs", DeleteRequest::ids(["a"]))
        .expect("delete must succeed");
    assert_eq!(database.stats().total_documents, 2);

    assert_eq!(database.count("docs").expect("count must succeed"), 2);
    let stats = database.stats();
    assert_eq!(stats.last_operation.as_deref(), Some("count"));
    assert_eq!(stats.last_status, Some(OperationStatus::Success));
    assert_eq!(stats.total_documents, 2);
}

#[test]
fn unwritable_telemetry_never_fails_operations() {
    let dir = tempfile::tempdir().expect("temp dir must be creatable");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"file where a directory should be").expect("blocker must be writable");

    let mut database = VectorDatabase::open(
        DatabaseConfig::in_memory().with_telemetry_dir(blocker.join("telemetry")),
        None,
    )
    .expect("open must succeed despite telemetry failure");
    seeded(&mut database);
    let result = database
        .get("docs", GetRequest::ids(["b"]))
        .expect("get must succeed");
    assert_eq!(result.ids, vec!["b".to_string()]);

    assert!(database.telemetry_warnings() >= 4);
    assert_eq!(database.stats().total_documents, 3);
}

#[test]
fn disabled_telemetry_writes_nothing() {
    let dir = tempfile::tempdir().expect("temp dir must be creatable");
    let mut database = VectorDatabase::open(
        DatabaseConfig::persistent(dir.path()).with_telemetry_enabled(false),
        None,
    )
    .expect("open must succeed");
    seeded(&mut database);

    assert!(database.telemetry().log_path().is_none());
    assert!(!dir.path().join("telemetry").exists());
    assert_eq!(database.telemetry_warnings(), 0);
}

#[test]
fn persistent_database_survives_reopen() {
    let dir = tempfile::tempdir().expect("temp dir must be creatable");
    let config = DatabaseConfig::persistent(dir.path()).with_wal_sync_on_write(false);
    {
        let mut database =
            VectorDatabase::open(config.clone(), None).expect("open must succeed");
        seeded(&mut database);
        database
            .update(
                "docs",
                UpdateRequest::new(["b"]).metadatas(vec![metadata(json!({"ripe": true}))]),
            )
            .expect("update must succeed");
        database.close().expect("close must succeed");
    }

    let database = VectorDatabase::open(config, None).expect("reopen must succeed");
    assert_eq!(database.count("docs").expect("count must succeed"), 3);
    let info = database
        .get_collection("docs")
        .expect("lookup must succeed")
        .expect("collection must exist");
    assert_eq!(info.metadata.get("topic"), Some(&json!("fruit")));

    let ripe = database
        .get(
            "docs",
            GetRequest::all().where_filter(WhereFilter::eq("ripe", true)),
        )
        .expect("get must succeed");
    assert_eq!(ripe.ids, vec!["b".to_string()]);
    assert!(dir.path().join("telemetry").join(STATS_FILE_NAME).exists());
}

#[test]
fn get_or_create_reports_whether_it_created() {
    let dir = tempfile::tempdir().expect("temp dir must be creatable");
    let mut database = VectorDatabase::open(
        DatabaseConfig::in_memory().with_telemetry_dir(dir.path()),
        None,
    )
    .expect("open must succeed");
    database
        .get_or_create_collection("docs", None)
        .expect("first call must create");
    database
        .get_or_create_collection("docs", None)
        .expect("second call must return existing");

    let lines = log_lines(dir.path());
    assert_eq!(lines[1]["details"]["created"], true);
    assert_eq!(lines[2]["details"]["created"], false);
}

#[test]
fn collection_handle_scopes_item_operations() {
    let mut database = VectorDatabase::in_memory(Some(Arc::new(HashEmbedding::new(16))))
        .expect("open must succeed");
    database
        .create_collection("notes", None)
        .expect("create must succeed");

    let mut notes = database.collection("notes").expect("handle must resolve");
    assert_eq!(notes.name(), "notes");
    notes
        .add(AddRequest::new(["n1", "n2", "n3"]).documents(["red fox", "blue whale", "red panda"]))
        .expect("add must succeed");
    assert_eq!(notes.count().expect("count must succeed"), 3);

    let peeked = notes.peek(2).expect("peek must succeed");
    assert_eq!(peeked.ids, vec!["n1".to_string(), "n2".to_string()]);

    let hits = notes
        .query(QueryRequest::texts(["blue whale"]).n_results(1))
        .expect("query must succeed");
    assert_eq!(hits.ids, vec![vec!["n2".to_string()]]);

    let error = database
        .collection("missing")
        .err()
        .expect("unknown collection must fail");
    assert!(error.is_not_found());
}

#[test]
fn reset_drops_every_collection() {
    let mut database = VectorDatabase::in_memory(None).expect("open must succeed");
    seeded(&mut database);
    database
        .create_collection("other", None)
        .expect("create must succeed");

    assert_eq!(database.reset().expect("reset must succeed"), 2);
    assert!(database
        .list_collections()
        .expect("list must succeed")
        .is_empty());
    assert_eq!(database.stats().total_collections, 0);
}

#[test]
fn heartbeat_is_monotonic_enough() {
    let database = VectorDatabase::in_memory(None).expect("open must succeed");
    let first = database.heartbeat();
    let second = database.heartbeat();
    assert!(first > 0);
    assert!(second >= first);
}

#[test]
fn peek_and_heartbeat_are_logged_under_their_own_names() {
    let dir = tempfile::tempdir().expect("temp dir must be creatable");
    let mut database = VectorDatabase::open(
        DatabaseConfig::in_memory().with_telemetry_dir(dir.path()),
        None,
    )
    .expect("open must succeed");
    seeded(&mut database);

    let peeked = database.peek("docs", 2).expect("peek must succeed");
    assert_eq!(peeked.len(), 2);
    let nanoseconds = database.heartbeat();

    let lines = log_lines(dir.path());
    let operations: Vec<&str> = lines
        .iter()
        .map(|line| line["operation"].as_str().expect("operation is a string"))
        .collect();
    assert_eq!(
        operations,
        vec!["initialize", "create_collection", "add", "peek", "heartbeat"]
    );

    let peek = &lines[3];
    assert_eq!(peek["status"], "success");
    assert_eq!(peek["collection"], "docs");
    assert_eq!(peek["details"]["limit"], 2);
    assert_eq!(peek["details"]["returned_count"], 2);

    let heartbeat = &lines[4];
    assert_eq!(heartbeat["status"], "success");
    assert!(heartbeat["collection"].is_null());
    assert_eq!(heartbeat["details"]["nanoseconds"], nanoseconds.to_string());
    assert_eq!(database.stats().last_operation.as_deref(), Some("heartbeat"));
}
