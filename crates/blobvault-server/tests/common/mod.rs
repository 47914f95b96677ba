// crates/blobvault-server/tests/common/mod.rs
// ============================================================================
// Module: HTTP Test Harness
// Description: Real server instances and multipart helpers for tests.
// Purpose: Drive the endpoint over loopback exactly as clients do.
// Dependencies: blobvault-server, reqwest, tokio
// ============================================================================

//! ## Overview
//! Starts a server on `127.0.0.1:0` backed by a temporary directory and offers
//! request builders plus a small parser for multipart responses.

#![allow(dead_code, reason = "Shared helpers are not used by every test binary.")]

use std::net::SocketAddr;
use std::path::Path;

use blobvault_config::BlobvaultConfig;
use blobvault_server::BlobServer;
use blobvault_server::ServerError;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Running server plus a client bound to it.
pub struct TestServer {
    /// Base URL of the endpoint.
    pub url: String,
    /// HTTP client for requests.
    pub client: reqwest::Client,
    /// Signals graceful shutdown.
    shutdown: oneshot::Sender<()>,
    /// Server task.
    task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Starts a server for `config` on an ephemeral loopback port.
    pub async fn start(config: BlobvaultConfig) -> Self {
        let server = BlobServer::from_config(config).expect("server from config");
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_on(listener, async move {
            let _ = signal.await;
        }));
        Self {
            url: format!("http://{addr}/"),
            client: reqwest::Client::new(),
            shutdown,
            task,
        }
    }

    /// Posts a multipart form.
    pub async fn post(&self, form: Form) -> reqwest::Response {
        self.client.post(&self.url).multipart(form).send().await.expect("send request")
    }

    /// Provisions a tenant and returns its identifier.
    pub async fn provision(&self, token: &str) -> String {
        let response = self.post(form(token, None, None, &[])).await;
        assert_eq!(response.status(), 200);
        response.text().await.expect("provision body")
    }

    /// Runs a statement and returns the response.
    pub async fn execute(
        &self,
        token: &str,
        db_id: &str,
        sql: &str,
        args: &[&[u8]],
    ) -> reqwest::Response {
        self.post(form(token, Some(db_id), Some(sql), args)).await
    }

    /// Runs a write statement and returns the decimal row id.
    pub async fn write(&self, token: &str, db_id: &str, sql: &str, args: &[&[u8]]) -> String {
        let response = self.execute(token, db_id, sql, args).await;
        assert_eq!(response.status(), 200);
        response.text().await.expect("write body")
    }

    /// Runs a read statement and returns the parsed parts.
    pub async fn read(
        &self,
        token: &str,
        db_id: &str,
        sql: &str,
        args: &[&[u8]],
    ) -> Vec<(String, Vec<u8>)> {
        let response = self.execute(token, db_id, sql, args).await;
        assert_eq!(response.status(), 200);
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .expect("content type")
            .to_string();
        let body = response.bytes().await.expect("read body");
        parse_multipart(&body, &boundary_of(&content_type))
    }

    /// Stops the server and waits for it to exit.
    pub async fn stop(self) {
        let Self {
            client,
            shutdown,
            task,
            ..
        } = self;
        drop(client);
        let _ = shutdown.send(());
        task.await.expect("server task").expect("server exit");
    }
}

/// Builds a config rooted in `base` with audit disabled.
pub fn test_config(base: &Path, token: &str) -> BlobvaultConfig {
    let mut config = BlobvaultConfig::default();
    config.storage.base_dir = base.join("dbs");
    config.server.auth_token = token.to_string();
    config.audit.enabled = false;
    config
}

/// Builds a request form.
pub fn form(token: &str, db_id: Option<&str>, sql: Option<&str>, args: &[&[u8]]) -> Form {
    let mut form = Form::new().text("token", token.to_string());
    if let Some(db_id) = db_id {
        form = form.text("dbId", db_id.to_string());
    }
    if let Some(sql) = sql {
        form = form.text("sqlQuery", sql.to_string());
    }
    for arg in args {
        form = form.part("sqlArg", Part::bytes(arg.to_vec()).file_name("arg"));
    }
    form
}

/// Extracts the boundary from a multipart content type.
pub fn boundary_of(content_type: &str) -> String {
    content_type
        .strip_prefix("multipart/form-data; boundary=")
        .expect("multipart content type")
        .to_string()
}

/// Splits a form-data body into `(name, value)` pairs.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Vec<(String, Vec<u8>)> {
    let opening = format!("--{boundary}\r\n");
    let separator = format!("\r\n--{boundary}\r\n");
    let closing = format!("\r\n--{boundary}--\r\n");
    assert!(body.ends_with(closing.as_bytes()), "missing closing delimiter");
    let body = &body[..body.len() - closing.len()];
    if body.is_empty() {
        return Vec::new();
    }
    assert!(body.starts_with(opening.as_bytes()), "missing opening delimiter");

    let mut parts = Vec::new();
    let mut rest = &body[opening.len()..];
    loop {
        match find(rest, separator.as_bytes()) {
            Some(index) => {
                parts.push(parse_part(&rest[..index]));
                rest = &rest[index + separator.len()..];
            }
            None => {
                parts.push(parse_part(rest));
                return parts;
            }
        }
    }
}

fn parse_part(part: &[u8]) -> (String, Vec<u8>) {
    let split = find(part, b"\r\n\r\n").expect("part header terminator");
    let header = std::str::from_utf8(&part[..split]).expect("utf-8 header");
    let name = header
        .strip_prefix("Content-Disposition: form-data; name=\"")
        .and_then(|rest| rest.strip_suffix('"'))
        .expect("content disposition");
    (name.to_string(), part[split + 4..].to_vec())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
