use std::collections::BTreeMap;

use ::common::entity::dead_letter_message;
use chrono::Utc;
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
use serde_json::json;
use uuid::Uuid;

use crate::common::{JOBS, TestApp, routes};

fn entry(id: i32, image_id: Option<Uuid>, resolved: bool) -> dead_letter_message::Model {
    let now = Utc::now();
    dead_letter_message::Model {
        id,
        message_id: format!("msg-{id}"),
        message_type: ::common::DERIVATION_JOB.to_string(),
        image_id,
        payload: image_id.map(|i| i.to_string()).unwrap_or_else(|| "junk".into()),
        error_code: "MAX_RETRIES_EXCEEDED".to_string(),
        error_message: "catalog backend error: connection refused".to_string(),
        retry_count: 3,
        retry_history: json!([
            {"attempt": 1, "error": "Error 1", "timestamp": now.to_rfc3339()},
            {"attempt": 2, "error": "Error 2", "timestamp": now.to_rfc3339()},
            {"attempt": 3, "error": "Error 3", "timestamp": now.to_rfc3339()},
        ]),
        first_failed_at: now,
        created_at: now,
        resolved,
        resolved_at: resolved.then_some(now),
    }
}

fn exec(rows_affected: u64) -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected,
    }
}

#[tokio::test]
async fn lists_with_pagination() {
    let count = BTreeMap::from([("num_items", Value::from(2i64))]);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![count]])
        .append_query_results([vec![
            entry(2, Some(Uuid::now_v7()), false),
            entry(1, None, false),
        ]])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.get(&format!("{}?resolved=false&per_page=1", routes::DLQ)).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["data"].as_array().unwrap().len(), 2);
    assert_eq!(res.body["data"][0]["id"], 2);
    assert_eq!(res.body["data"][1]["image_id"], serde_json::Value::Null);
    assert_eq!(res.body["pagination"]["total"], 2);
    assert_eq!(res.body["pagination"]["per_page"], 1);
    assert_eq!(res.body["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn get_returns_payload_and_history() {
    let image_id = Uuid::now_v7();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry(5, Some(image_id), false)]])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.get(&routes::dlq_message(5)).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["payload"], image_id.to_string().as_str());
    assert_eq!(res.body["error_code"], "MAX_RETRIES_EXCEEDED");
    assert_eq!(res.body["retry_history"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn get_unknown_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<dead_letter_message::Model>::new()])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.get(&routes::dlq_message(99)).await;

    assert_eq!(res.status, 404);
    assert_eq!(res.code(), "NOT_FOUND");
}

#[tokio::test]
async fn retry_republishes_image_id() {
    let image_id = Uuid::now_v7();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry(3, Some(image_id), false)]])
        .append_exec_results([exec(1)])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.post(&routes::dlq_retry(3)).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(app.queue.pending(JOBS), vec![image_id.to_string()]);
}

#[tokio::test]
async fn retry_without_image_id_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry(4, None, false)]])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.post(&routes::dlq_retry(4)).await;

    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "VALIDATION_ERROR");
    assert!(app.queue.pending(JOBS).is_empty());
}

#[tokio::test]
async fn retry_of_resolved_message_conflicts() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![entry(6, Some(Uuid::now_v7()), true)]])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.post(&routes::dlq_retry(6)).await;

    assert_eq!(res.status, 409);
    assert_eq!(res.code(), "CONFLICT");
    assert!(app.queue.pending(JOBS).is_empty());
}

#[tokio::test]
async fn delete_resolves_message() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([exec(1)])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.delete(&routes::dlq_message(7)).await;

    assert_eq!(res.status, 204);
}

#[tokio::test]
async fn delete_unknown_is_not_found() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([exec(0)])
        .append_query_results([Vec::<dead_letter_message::Model>::new()])
        .into_connection();
    let app = TestApp::spawn_with_db(db).await;

    let res = app.delete(&routes::dlq_message(8)).await;

    assert_eq!(res.status, 404);
}
