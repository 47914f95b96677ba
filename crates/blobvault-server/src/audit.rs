// crates/blobvault-server/src/audit.rs
// ============================================================================
// Module: Audit Logging
// Description: Structured audit events for startup and request handling.
// Purpose: Emit JSON-line records without a hard logging dependency.
// Dependencies: blobvault-config, serde, serde_json
// ============================================================================

//! ## Overview
//! Every request produces exactly one [`RequestAuditEvent`]. Events carry
//! sizes, counts, and labels only; tokens, statement text, and payload bytes
//! are never recorded. Sinks write one JSON object per line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use blobvault_config::AuditConfig;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request classification recorded on audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Request ended before a branch was chosen.
    Rejected,
    /// New tenant provisioning.
    Provision,
    /// Read statement.
    Read,
    /// Write statement.
    Write,
}

/// Final request outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Response completed.
    Ok,
    /// Request failed before a response body was produced.
    Error,
    /// Streamed response was cut off after it started.
    Aborted,
}

/// Per-request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Server-issued correlation id.
    pub request_id: String,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Request classification.
    pub action: AuditAction,
    /// Tenant identifier when known.
    pub tenant_id: Option<String>,
    /// Request outcome.
    pub outcome: AuditOutcome,
    /// HTTP status sent to the caller.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Declared request body size in bytes.
    pub request_bytes: Option<u64>,
    /// Statement argument count.
    pub param_count: usize,
    /// Rows streamed (reads).
    pub rows: Option<u64>,
    /// Last inserted row id (writes).
    pub row_id: Option<i64>,
}

/// Inputs required to construct a request audit event.
pub struct RequestAuditEventParams {
    /// Server-issued correlation id.
    pub request_id: String,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Request classification.
    pub action: AuditAction,
    /// Tenant identifier when known.
    pub tenant_id: Option<String>,
    /// Request outcome.
    pub outcome: AuditOutcome,
    /// HTTP status sent to the caller.
    pub status: u16,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Declared request body size in bytes.
    pub request_bytes: Option<u64>,
    /// Statement argument count.
    pub param_count: usize,
    /// Rows streamed (reads).
    pub rows: Option<u64>,
    /// Last inserted row id (writes).
    pub row_id: Option<i64>,
}

/// Startup audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct StartupAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Configured bind address.
    pub bind: String,
    /// Tenant storage directory.
    pub base_dir: String,
    /// Tenants registered by enumeration.
    pub tenants_registered: usize,
    /// Files skipped by enumeration.
    pub tenants_skipped: usize,
    /// Whether the shared secret is empty.
    pub auth_disabled: bool,
}

/// Security posture audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Security event kind.
    pub kind: &'static str,
    /// Optional message.
    pub message: Option<String>,
}

impl RequestAuditEvent {
    /// Creates a new request audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: RequestAuditEventParams) -> Self {
        Self {
            event: "blob_request",
            timestamp_ms: now_ms(),
            request_id: params.request_id,
            peer_ip: params.peer_ip,
            action: params.action,
            tenant_id: params.tenant_id,
            outcome: params.outcome,
            status: params.status,
            error_kind: params.error_kind,
            request_bytes: params.request_bytes,
            param_count: params.param_count,
            rows: params.rows,
            row_id: params.row_id,
        }
    }
}

impl StartupAuditEvent {
    /// Creates a startup event.
    #[must_use]
    pub fn new(
        bind: String,
        base_dir: &Path,
        tenants_registered: usize,
        tenants_skipped: usize,
        auth_disabled: bool,
    ) -> Self {
        Self {
            event: "startup",
            timestamp_ms: now_ms(),
            bind,
            base_dir: base_dir.display().to_string(),
            tenants_registered,
            tenants_skipped,
            auth_disabled,
        }
    }
}

impl SecurityAuditEvent {
    /// Creates a security posture event.
    #[must_use]
    pub fn new(kind: &'static str, message: Option<String>) -> Self {
        Self {
            event: "security_audit",
            timestamp_ms: now_ms(),
            kind,
            message,
        }
    }
}

/// Milliseconds since the Unix epoch, zero if the clock is before it.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for server events.
pub trait AuditSink: Send + Sync {
    /// Record a request event.
    fn record(&self, event: &RequestAuditEvent);

    /// Record a startup event.
    fn record_startup(&self, _event: &StartupAuditEvent) {}

    /// Record a security posture event.
    fn record_security(&self, _event: &SecurityAuditEvent) {}
}

/// Builds the sink selected by configuration.
///
/// # Errors
///
/// Returns an error when the configured audit file cannot be opened.
pub fn sink_from_config(config: &AuditConfig) -> io::Result<Arc<dyn AuditSink>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => Ok(Arc::new(FileAuditSink::new(path)?)),
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event to stderr.
    fn emit(event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        Self::emit(event);
    }

    fn record_startup(&self, event: &StartupAuditEvent) {
        Self::emit(event);
    }

    fn record_security(&self, event: &SecurityAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event and flushes.
    fn emit(&self, event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &RequestAuditEvent) {
        self.emit(event);
    }

    fn record_startup(&self, event: &StartupAuditEvent) {
        self.emit(event);
    }

    fn record_security(&self, event: &SecurityAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &RequestAuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================
