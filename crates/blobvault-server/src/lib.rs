// crates/blobvault-server/src/lib.rs
// ============================================================================
// Module: Blobvault Server Library
// Description: HTTP front end for the multi-tenant blob store.
// Purpose: Expose the multipart endpoint, auth gate, and audit sinks.
// Dependencies: axum, tokio, blobvault-config, blobvault-store-sqlite
// ============================================================================

//! ## Overview
//! One endpoint accepts `multipart/form-data` requests that either provision
//! a tenant or run a statement against one. Security posture: every request
//! field is untrusted; the shared secret is the only authorization.

pub mod audit;
pub mod auth;
pub mod codec;
pub mod correlation;
pub mod error;
pub mod server;

pub use audit::AuditAction;
pub use audit::AuditOutcome;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::SecurityAuditEvent;
pub use audit::StartupAuditEvent;
pub use audit::StderrAuditSink;
pub use auth::AuthGate;
pub use codec::BlobRequest;
pub use codec::MultipartEncoder;
pub use correlation::CorrelationIdGenerator;
pub use correlation::SERVER_CORRELATION_HEADER;
pub use error::RequestError;
pub use server::BlobServer;
pub use server::ServerError;
