// crates/blobvault-server/src/server.rs
// ============================================================================
// Module: Blob Server
// Description: Single multipart endpoint for provisioning, reads, and writes.
// Purpose: Route each request through auth, the registry, and the executor.
// Dependencies: axum, tokio, tokio-stream, blobvault-store-sqlite
// ============================================================================

//! ## Overview
//! Every path is served by one handler. A request must be a
//! `multipart/form-data` POST; its `token` is checked by the [`AuthGate`],
//! then an absent or empty `dbId` provisions a new tenant while a present one
//! runs `sqlQuery` against that tenant. Store work runs on blocking workers.
//!
//! Read results stream from the worker through a bounded channel. The status
//! is chosen from the first message: a failure before any row is a `500`,
//! while a failure after rows were sent breaks the body stream so the client
//! never sees a clean but truncated response.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::io;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::FromRequest;
use axum::extract::Multipart;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use blobvault_config::AUTH_TOKEN_ENV_VAR;
use blobvault_config::BlobvaultConfig;
use blobvault_store_sqlite::EnumerationReport;
use blobvault_store_sqlite::ExecOutcome;
use blobvault_store_sqlite::QueryExecutor;
use blobvault_store_sqlite::RowSink;
use blobvault_store_sqlite::StatementKind;
use blobvault_store_sqlite::StatementParams;
use blobvault_store_sqlite::StoreError;
use blobvault_store_sqlite::StoreRow;
use blobvault_store_sqlite::TenantHandle;
use blobvault_store_sqlite::TenantRegistry;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::audit::AuditAction;
use crate::audit::AuditOutcome;
use crate::audit::AuditSink;
use crate::audit::RequestAuditEvent;
use crate::audit::RequestAuditEventParams;
use crate::audit::SecurityAuditEvent;
use crate::audit::StartupAuditEvent;
use crate::audit::sink_from_config;
use crate::auth::AuthGate;
use crate::codec::MultipartEncoder;
use crate::codec::read_request;
use crate::correlation::CorrelationIdGenerator;
use crate::correlation::SERVER_CORRELATION_HEADER;
use crate::error::RequestError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Encoded rows buffered between the read worker and the response body.
pub const READ_CHANNEL_CAPACITY: usize = 16;
/// Content type for provisioning and write responses.
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
/// Content type marker required on every request.
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

// ============================================================================
// SECTION: Blob Server
// ============================================================================

/// Blob server instance.
pub struct BlobServer {
    /// Server configuration.
    config: BlobvaultConfig,
    /// Shared handler state.
    state: Arc<AppState>,
    /// Result of the startup tenant scan.
    enumeration: EnumerationReport,
}

/// State shared by every request.
struct AppState {
    /// Tenant handles by identifier.
    registry: TenantRegistry,
    /// Shared-secret gate.
    auth: AuthGate,
    /// Audit sink for request events.
    audit: Arc<dyn AuditSink>,
    /// Correlation id source.
    correlation: CorrelationIdGenerator,
}

impl BlobServer {
    /// Builds a server from configuration, enumerating persisted tenants.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid, the audit sink
    /// cannot be opened, or the tenant directory cannot be listed.
    pub fn from_config(mut config: BlobvaultConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let audit = sink_from_config(&config.audit)
            .map_err(|err| ServerError::Init(format!("audit sink: {err}")))?;
        let (registry, enumeration) = TenantRegistry::open(config.storage.to_store_config())
            .map_err(|err| ServerError::Init(err.to_string()))?;
        let auth = AuthGate::new(config.server.auth_token.clone());

        audit.record_startup(&StartupAuditEvent::new(
            config.server.bind.clone(),
            registry.base_dir(),
            enumeration.registered.len(),
            enumeration.skipped.len(),
            auth.is_disabled(),
        ));
        if auth.is_disabled() {
            emit_auth_disabled_warning(audit.as_ref());
        }

        let state = Arc::new(AppState {
            registry,
            auth,
            audit,
            correlation: CorrelationIdGenerator::default(),
        });
        Ok(Self {
            config,
            state,
            enumeration,
        })
    }

    /// Returns the validated configuration.
    #[must_use]
    pub const fn config(&self) -> &BlobvaultConfig {
        &self.config
    }

    /// Returns the tenant registry.
    #[must_use]
    pub fn registry(&self) -> &TenantRegistry {
        &self.state.registry
    }

    /// Returns the startup enumeration report.
    #[must_use]
    pub const fn enumeration(&self) -> &EnumerationReport {
        &self.enumeration
    }

    /// Builds the router serving every path with the request handler.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::<Arc<AppState>>::new()
            .fallback(handle_request)
            .layer(DefaultBodyLimit::max(self.config.server.max_body_bytes))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| ServerError::Transport(format!("bind {addr} failed: {err}")))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the HTTP server fails.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

/// Warns that the shared secret is empty and every caller is accepted.
fn emit_auth_disabled_warning(audit: &dyn AuditSink) {
    let _ = writeln!(
        io::stderr(),
        "blobvault-server: WARNING: auth token is empty so every request is accepted; set \
         server.auth_token or {AUTH_TOKEN_ENV_VAR}"
    );
    audit.record_security(&SecurityAuditEvent::new(
        "auth_disabled",
        Some("shared secret is empty".to_string()),
    ));
}

// ============================================================================
// SECTION: Request Handling
// ============================================================================

/// Handles every inbound request.
async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let mut trace = RequestTrace::start(&state, &request);
    let request_id = trace.request_id.clone();
    let mut response = match dispatch(&state, &mut trace, request).await {
        Ok(response) => response,
        Err(err) => {
            trace.record(state.audit.as_ref(), &Completion::failed(&err));
            err.into_response()
        }
    };
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(SERVER_CORRELATION_HEADER, value);
    }
    response
}

/// Validates, parses, and authorizes a request, then picks a branch.
async fn dispatch(
    state: &Arc<AppState>,
    trace: &mut RequestTrace,
    request: Request,
) -> Result<Response, RequestError> {
    if request.method() != Method::POST || !is_multipart(&request) {
        return Err(RequestError::BadShape);
    }
    let mut multipart = Multipart::from_request(request, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RequestError::TooLarge
        } else {
            RequestError::BadShape
        }
    })?;
    let parsed = read_request(&mut multipart).await?;
    trace.param_count = parsed.args.len();
    if !state.auth.authorize(parsed.token.as_deref()) {
        return Err(RequestError::Unauthorized);
    }

    let Some(tenant) = parsed.tenant()?.map(str::to_owned) else {
        return provision(state, trace).await;
    };
    let handle = state.registry.lookup(&tenant).map_err(|err| match err {
        StoreError::NotFound(_) => RequestError::UnknownTenant,
        other => RequestError::Internal(other.to_string()),
    })?;
    trace.tenant_id = Some(handle.id().to_string());

    let sql = parsed.statement()?.to_owned();
    let args = parsed.args;
    match StatementKind::classify(&sql) {
        StatementKind::Read => run_read(state, trace, handle, sql, args).await,
        StatementKind::Write => run_write(state, trace, handle, sql, args).await,
    }
}

/// Returns true when the content type names a multipart form body.
fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains(MULTIPART_FORM_DATA))
}

/// Provisions a tenant and returns its identifier as plain text.
async fn provision(
    state: &Arc<AppState>,
    trace: &mut RequestTrace,
) -> Result<Response, RequestError> {
    trace.action = AuditAction::Provision;
    let worker = Arc::clone(state);
    let (id, _) = tokio::task::spawn_blocking(move || worker.registry.provision())
        .await
        .map_err(|err| RequestError::Internal(format!("provision worker failed: {err}")))?
        .map_err(|err| RequestError::Internal(err.to_string()))?;
    trace.tenant_id = Some(id.to_string());
    trace.record(state.audit.as_ref(), &Completion::ok());
    Ok(plain_text(id.to_string()))
}

/// Runs a write statement and returns the row id as plain text.
async fn run_write(
    state: &Arc<AppState>,
    trace: &mut RequestTrace,
    handle: TenantHandle,
    sql: String,
    args: StatementParams,
) -> Result<Response, RequestError> {
    trace.action = AuditAction::Write;
    let outcome = tokio::task::spawn_blocking(move || {
        QueryExecutor.execute(&handle, &sql, &args, &mut Vec::<StoreRow>::new())
    })
    .await
    .map_err(|err| RequestError::Internal(format!("write worker failed: {err}")))?
    .map_err(|err| RequestError::Execution(err.to_string()))?;
    let ExecOutcome::Write {
        row_id,
    } = outcome
    else {
        return Err(RequestError::Internal("write statement produced a read".to_string()));
    };
    trace.record(state.audit.as_ref(), &Completion::ok().with_row_id(row_id));
    Ok(plain_text(row_id.to_string()))
}

/// Streams a read statement as a multipart response.
async fn run_read(
    state: &Arc<AppState>,
    trace: &mut RequestTrace,
    handle: TenantHandle,
    sql: String,
    args: StatementParams,
) -> Result<Response, RequestError> {
    trace.action = AuditAction::Read;
    let encoder = MultipartEncoder::new();
    let content_type = encoder.content_type();
    let (tx, mut rx) = mpsc::channel(READ_CHANNEL_CAPACITY);
    let audit = Arc::clone(&state.audit);
    let worker_trace = trace.clone();
    drop(tokio::task::spawn_blocking(move || {
        stream_rows(&handle, &sql, &args, encoder, tx, audit.as_ref(), &worker_trace);
    }));

    let first = match rx.recv().await {
        Some(ReadEvent::Chunk(bytes) | ReadEvent::Finished(bytes)) => bytes,
        Some(ReadEvent::Failed(message)) => return Err(RequestError::Execution(message)),
        None => return Err(RequestError::Internal("read worker exited early".to_string())),
    };
    let rest = ReceiverStream::new(rx).map(ReadEvent::into_chunk);
    let body = Body::from_stream(tokio_stream::once(Ok(first)).chain(rest));
    Ok(([(CONTENT_TYPE, content_type)], body).into_response())
}

/// Builds a `200` plain-text response.
fn plain_text(body: String) -> Response {
    ([(CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response()
}

// ============================================================================
// SECTION: Read Streaming
// ============================================================================

/// Message from the read worker to the response body.
#[derive(Debug)]
enum ReadEvent {
    /// Encoded parts for one row.
    Chunk(Bytes),
    /// Closing delimiter after the last row.
    Finished(Bytes),
    /// Statement failed; the transaction was rolled back.
    Failed(String),
}

impl ReadEvent {
    /// Converts a message into a body frame.
    fn into_chunk(self) -> Result<Bytes, io::Error> {
        match self {
            Self::Chunk(bytes) | Self::Finished(bytes) => Ok(bytes),
            Self::Failed(message) => Err(io::Error::other(message)),
        }
    }
}

/// Row sink that encodes rows and forwards them to the response body.
struct ChannelRowSink {
    /// Channel to the response body.
    tx: mpsc::Sender<ReadEvent>,
    /// Multipart writer state.
    encoder: MultipartEncoder,
    /// Rows forwarded so far.
    rows: u64,
}

impl RowSink for ChannelRowSink {
    fn push(&mut self, row: StoreRow) -> Result<(), StoreError> {
        let chunk = self.encoder.encode_row(&row);
        self.tx
            .blocking_send(ReadEvent::Chunk(chunk))
            .map_err(|_| StoreError::Aborted("response stream closed".to_string()))?;
        self.rows += 1;
        Ok(())
    }
}

/// Executes a read on a blocking worker, forwarding rows as they arrive.
///
/// A failure before the first row is reported by the handler as a `500`, so
/// only streams that started (or lost their client) are recorded here.
fn stream_rows(
    handle: &TenantHandle,
    sql: &str,
    args: &StatementParams,
    encoder: MultipartEncoder,
    tx: mpsc::Sender<ReadEvent>,
    audit: &dyn AuditSink,
    trace: &RequestTrace,
) {
    let mut sink = ChannelRowSink {
        tx,
        encoder,
        rows: 0,
    };
    let result = QueryExecutor.execute(handle, sql, args, &mut sink);
    let rows = sink.rows;
    match result {
        Ok(_) => {
            let trailer = sink.encoder.finish();
            let outcome = if sink.tx.blocking_send(ReadEvent::Finished(trailer)).is_ok() {
                AuditOutcome::Ok
            } else {
                AuditOutcome::Aborted
            };
            trace.record(audit, &Completion::ok().with_outcome(outcome).with_rows(rows));
        }
        Err(StoreError::Aborted(_)) => {
            let completion =
                Completion::ok().with_outcome(AuditOutcome::Aborted).with_rows(rows);
            trace.record(audit, &completion.with_error_kind("client_gone"));
        }
        Err(err) => {
            let _ = sink.tx.blocking_send(ReadEvent::Failed(err.to_string()));
            if rows > 0 {
                let completion =
                    Completion::ok().with_outcome(AuditOutcome::Aborted).with_rows(rows);
                trace.record(audit, &completion.with_error_kind("execution"));
            }
        }
    }
}

// ============================================================================
// SECTION: Audit Helpers
// ============================================================================

/// Request facts accumulated while handling.
#[derive(Debug, Clone)]
struct RequestTrace {
    /// Server-issued correlation id.
    request_id: String,
    /// Peer address when known.
    peer_ip: Option<String>,
    /// Declared body size.
    request_bytes: Option<u64>,
    /// Branch taken.
    action: AuditAction,
    /// Tenant identifier when known.
    tenant_id: Option<String>,
    /// Statement argument count.
    param_count: usize,
}

impl RequestTrace {
    /// Captures request metadata before the body is consumed.
    fn start(state: &AppState, request: &Request) -> Self {
        let peer_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let request_bytes = request
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        Self {
            request_id: state.correlation.issue(),
            peer_ip,
            request_bytes,
            action: AuditAction::Rejected,
            tenant_id: None,
            param_count: 0,
        }
    }

    /// Emits the request audit event.
    fn record(&self, sink: &dyn AuditSink, completion: &Completion) {
        sink.record(&RequestAuditEvent::new(RequestAuditEventParams {
            request_id: self.request_id.clone(),
            peer_ip: self.peer_ip.clone(),
            action: self.action,
            tenant_id: self.tenant_id.clone(),
            outcome: completion.outcome,
            status: completion.status.as_u16(),
            error_kind: completion.error_kind,
            request_bytes: self.request_bytes,
            param_count: self.param_count,
            rows: completion.rows,
            row_id: completion.row_id,
        }));
    }
}

/// How a request ended.
#[derive(Debug, Clone, Copy)]
struct Completion {
    /// Final outcome.
    outcome: AuditOutcome,
    /// Status sent to the caller.
    status: StatusCode,
    /// Error label, if any.
    error_kind: Option<&'static str>,
    /// Rows streamed.
    rows: Option<u64>,
    /// Inserted row id.
    row_id: Option<i64>,
}

impl Completion {
    /// Successful `200` completion.
    const fn ok() -> Self {
        Self {
            outcome: AuditOutcome::Ok,
            status: StatusCode::OK,
            error_kind: None,
            rows: None,
            row_id: None,
        }
    }

    /// Failed completion carrying the error's status and label.
    const fn failed(err: &RequestError) -> Self {
        Self {
            outcome: AuditOutcome::Error,
            status: err.status(),
            error_kind: Some(err.kind()),
            rows: None,
            row_id: None,
        }
    }

    /// Overrides the outcome.
    const fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Sets the error label.
    const fn with_error_kind(mut self, kind: &'static str) -> Self {
        self.error_kind = Some(kind);
        self
    }

    /// Sets the streamed row count.
    const fn with_rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Sets the inserted row id.
    const fn with_row_id(mut self, row_id: i64) -> Self {
        self.row_id = Some(row_id);
        self
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Blob server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
