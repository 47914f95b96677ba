// crates/blobvault-store-sqlite/src/lib.rs
// ============================================================================
// Module: Blobvault SQLite Store
// Description: Per-tenant SQLite storage, registry, and statement execution.
// Purpose: Own every tenant database handle and run caller statements.
// Dependencies: rand, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! Each tenant of a blobvault deployment owns exactly one `SQLite` file inside
//! a shared base directory. This crate provides the [`TenantRegistry`] that
//! enumerates and provisions those files, and the [`QueryExecutor`] that runs
//! caller-supplied statements against a tenant handle with positional blob
//! parameters. Security posture: statement text and parameters are untrusted
//! and are executed inside a per-request transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod executor;
pub mod registry;
pub mod tenant;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::StoreError;
pub use executor::ExecOutcome;
pub use executor::QueryExecutor;
pub use executor::RowSink;
pub use executor::StatementKind;
pub use executor::StatementParams;
pub use executor::StoreRow;
pub use registry::EnumerationReport;
pub use registry::TenantRegistry;
pub use tenant::SqliteStoreMode;
pub use tenant::SqliteSyncMode;
pub use tenant::TenantHandle;
pub use tenant::TenantId;
pub use tenant::TenantStoreConfig;
