// crates/blobvault-server/tests/http_protocol.rs
// ============================================================================
// Module: HTTP Protocol Tests
// Description: End-to-end provisioning, reads, writes, and rejections.
// Purpose: Validate the multipart wire protocol against a live server.
// Dependencies: blobvault-server, reqwest, tempfile, tokio
// ============================================================================

//! ## Overview
//! Every test starts a real server on a loopback port and talks to it with a
//! multipart HTTP client.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use common::TestServer;
use common::form;
use common::test_config;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use tempfile::TempDir;

// ============================================================================
// SECTION: Constants
// ============================================================================

const TOKEN: &str = "s3cret";
const INSERT: &str = "insert into store(type, data) values (?, ?)";

// ============================================================================
// SECTION: Provisioning
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn provision_returns_hex_identifier_and_correlation_header() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;

    let response = server.post(form(TOKEN, None, None, &[])).await;
    assert_eq!(response.status(), 200);
    let correlation = response
        .headers()
        .get("x-server-correlation-id")
        .and_then(|value| value.to_str().ok())
        .unwrap()
        .to_string();
    assert!(correlation.starts_with("bv-"));
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
    let id = response.text().await.unwrap();

    assert_eq!(id.len(), 64);
    assert!(id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
    assert!(temp.path().join("dbs").join(format!("{id}.db")).is_file());
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_db_id_also_provisions() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;

    let response = server.post(form(TOKEN, Some(""), Some("select * from store"), &[])).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap().len(), 64);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_provisioning_issues_unique_ids() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let client = server.client.clone();
        let url = server.url.clone();
        tasks.spawn(async move {
            let response =
                client.post(&url).multipart(form(TOKEN, None, None, &[])).send().await.unwrap();
            assert_eq!(response.status(), 200);
            response.text().await.unwrap()
        });
    }
    let mut ids = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        assert!(ids.insert(joined.unwrap()));
    }
    assert_eq!(ids.len(), 8);
    for id in &ids {
        assert_eq!(server.write(TOKEN, id, INSERT, &[b"n".as_slice(), b"v"]).await, "1");
    }
    server.stop().await;
}

// ============================================================================
// SECTION: Reads And Writes
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn insert_then_select_scenario() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;

    let first: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
    let second: [u8; 4] = [0xfe, 0xed, 0xfa, 0xce];
    assert_eq!(server.write(TOKEN, &id, INSERT, &[b"note".as_slice(), &first]).await, "1");
    assert_eq!(server.write(TOKEN, &id, INSERT, &[b"note".as_slice(), &second]).await, "2");

    let response = server.execute(TOKEN, &id, "select * from store", &[]).await;
    assert_eq!(response.status(), 200);
    let content_type =
        response.headers().get("content-type").unwrap().to_str().unwrap().to_string();
    let boundary = common::boundary_of(&content_type);
    assert_eq!(boundary.len(), 60);
    let body = response.bytes().await.unwrap();
    let parts = common::parse_multipart(&body, &boundary);

    assert_eq!(parts.len(), 8);
    let names: Vec<&str> = parts.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        ["id", "type", "data", "timestamp", "id", "type", "data", "timestamp"]
    );
    assert_eq!(parts[0].1, b"1");
    assert_eq!(parts[1].1, b"note");
    assert_eq!(parts[2].1, first);
    assert_eq!(parts[3].1.len(), "YYYY-MM-DD HH:MM:SS".len());
    assert_eq!(parts[4].1, b"2");
    assert_eq!(parts[6].1, second);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn read_returns_one_field_set_per_matching_row() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    for label in ["a", "b", "a", "c", "a"] {
        server.write(TOKEN, &id, INSERT, &[label.as_bytes(), b"x"]).await;
    }

    let parts =
        server.read(TOKEN, &id, "SELECT * FROM store WHERE type = ?", &[b"a".as_slice()]).await;
    assert_eq!(parts.len(), 12);
    let ids: Vec<Vec<u8>> = parts.chunks(4).map(|row| row[0].1.clone()).collect();
    assert_eq!(ids, vec![b"1".to_vec(), b"3".to_vec(), b"5".to_vec()]);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn read_with_no_rows_returns_empty_multipart() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;

    let parts = server.read(TOKEN, &id, "select * from store", &[]).await;
    assert!(parts.is_empty());
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn binary_payload_round_trips_exactly() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    let payload: Vec<u8> = (0..=255u8).rev().chain([0, b'\r', b'\n', b'-', b'-']).collect();

    server.write(TOKEN, &id, INSERT, &[b"bin".as_slice(), &payload]).await;
    let parts = server.read(TOKEN, &id, "select * from store where type = ?", &[b"bin"]).await;
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[2].1, payload);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn non_utf8_type_label_round_trips_exactly() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    let label: [u8; 3] = [0xff, 0x00, 0xc3];
    server.write(TOKEN, &id, INSERT, &[label.as_slice(), b"d"]).await;

    let parts = server.read(TOKEN, &id, "select * from store", &[]).await;
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[1], ("type".to_string(), label.to_vec()));
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn read_failing_after_first_row_breaks_the_transfer() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    let sql = "select * from (select 1, 'a', x'00', 't' union all select 'x', 'b', x'01', 't')";

    let sent = server
        .client
        .post(&server.url)
        .multipart(form(TOKEN, Some(&id), Some(sql), &[]))
        .send()
        .await;
    // The failure can surface before or after the response head arrives.
    if let Ok(response) = sent {
        assert_eq!(response.status(), 200);
        assert!(response.bytes().await.is_err(), "a failed read must not complete cleanly");
    }

    assert_eq!(server.write(TOKEN, &id, INSERT, &[b"after".as_slice(), b"1"]).await, "1");
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn leading_whitespace_select_is_routed_as_write() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    server.write(TOKEN, &id, INSERT, &[b"a".as_slice(), b"1"]).await;

    let response = server.execute(TOKEN, &id, "  SELECT * FROM store", &[]).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "1");
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn tenants_survive_restart() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    server.write(TOKEN, &id, INSERT, &[b"keep".as_slice(), b"me"]).await;
    server.stop().await;

    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let parts = server.read(TOKEN, &id, "select * from store", &[]).await;
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[1].1, b"keep");
    assert_eq!(parts[2].1, b"me");
    server.stop().await;
}

// ============================================================================
// SECTION: Rejections
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn wrong_or_missing_token_is_unauthorized() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;

    let response = server.post(form("wrong", None, None, &[])).await;
    assert_eq!(response.status(), 401);
    assert!(response.bytes().await.unwrap().is_empty());

    let response = server.execute("wrong", &id, "select * from store", &[]).await;
    assert_eq!(response.status(), 401);

    let unknown = "0".repeat(64);
    let response = server.execute("", &unknown, "drop table store", &[]).await;
    assert_eq!(response.status(), 401);

    let no_token = Form::new().text("dbId", id.clone());
    assert_eq!(server.post(no_token).await.status(), 401);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn credential_is_checked_before_text_fields_are_decoded() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    let garbled = [0xff, 0xfe, b's'];

    let bad_statement = Form::new()
        .text("token", "wrong")
        .text("dbId", id.clone())
        .part("sqlQuery", Part::bytes(garbled.to_vec()));
    assert_eq!(server.post(bad_statement).await.status(), 401);

    let bad_tenant = Form::new()
        .text("token", "wrong")
        .part("dbId", Part::bytes(garbled.to_vec()))
        .text("sqlQuery", "select * from store");
    assert_eq!(server.post(bad_tenant).await.status(), 401);

    let bad_token = Form::new()
        .part("token", Part::bytes(garbled.to_vec()))
        .text("dbId", id.clone())
        .text("sqlQuery", "select * from store");
    assert_eq!(server.post(bad_token).await.status(), 401);

    let authorized = Form::new()
        .text("token", TOKEN)
        .text("dbId", id)
        .part("sqlQuery", Part::bytes(garbled.to_vec()));
    assert_eq!(server.post(authorized).await.status(), 400);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_tenant_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    server.provision(TOKEN).await;

    let never_issued = "ab".repeat(32);
    let response = server.execute(TOKEN, &never_issued, "select * from store", &[]).await;
    assert_eq!(response.status(), 400);
    assert!(response.bytes().await.unwrap().is_empty());

    let response = server.execute(TOKEN, "../../etc/passwd", "select * from store", &[]).await;
    assert_eq!(response.status(), 400);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_method_or_content_type_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;

    let response = server.client.get(&server.url).send().await.unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .client
        .post(&server.url)
        .header("content-type", "application/json")
        .body(r#"{"token":"s3cret"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = server
        .client
        .post(format!("{}any/path", server.url))
        .multipart(form(TOKEN, None, None, &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_statement_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;

    let response = server.post(form(TOKEN, Some(&id), None, &[])).await;
    assert_eq!(response.status(), 400);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_failures_are_scoped_to_the_request() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), TOKEN)).await;
    let id = server.provision(TOKEN).await;
    let other = server.provision(TOKEN).await;

    let response = server.execute(TOKEN, &id, "insert into nowhere values (1)", &[]).await;
    assert_eq!(response.status(), 500);
    assert!(response.bytes().await.unwrap().is_empty());

    let response = server.execute(TOKEN, &id, "select * from nowhere", &[]).await;
    assert_eq!(response.status(), 500);

    let response = server.execute(TOKEN, &id, "select id from store", &[]).await;
    assert_eq!(response.status(), 500);

    let response = server.execute(TOKEN, &id, INSERT, &[b"only-one".as_slice()]).await;
    assert_eq!(response.status(), 500);

    assert_eq!(server.write(TOKEN, &id, INSERT, &[b"ok".as_slice(), b"1"]).await, "1");
    assert_eq!(server.write(TOKEN, &other, INSERT, &[b"ok".as_slice(), b"1"]).await, "1");
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_body_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path(), TOKEN);
    config.server.max_body_bytes = 1024;
    let server = TestServer::start(config).await;
    let id = server.provision(TOKEN).await;

    let big = vec![0x5a; 8 * 1024];
    let response = server.execute(TOKEN, &id, INSERT, &[b"big".as_slice(), &big]).await;
    assert_eq!(response.status(), 413);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_secret_accepts_requests_without_token() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(test_config(temp.path(), "")).await;

    let response = server.post(Form::new().text("note", "hi")).await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap().len(), 64);

    let response = server.post(form("anything", None, None, &[])).await;
    assert_eq!(response.status(), 401);
    server.stop().await;
}
