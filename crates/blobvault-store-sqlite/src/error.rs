// crates/blobvault-store-sqlite/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Error taxonomy for tenant storage and statement execution.
// Purpose: Keep engine failures scoped to a single request.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Error taxonomy for tenant storage and statement execution.

use thiserror::Error;

/// Tenant store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error while listing or creating tenant files.
    #[error("tenant store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("tenant store db error: {0}")]
    Db(String),
    /// Invalid input or unexpected result shape.
    #[error("tenant store invalid data: {0}")]
    Invalid(String),
    /// Tenant identifier is not registered.
    #[error("unknown tenant: {0}")]
    NotFound(String),
    /// Row consumer stopped accepting rows.
    #[error("read aborted: {0}")]
    Aborted(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}
