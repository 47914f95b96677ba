// crates/blobvault-store-sqlite/src/tenant.rs
// ============================================================================
// Module: Tenant Storage
// Description: Tenant identifiers, handles, and SQLite file setup.
// Purpose: Open tenant databases with consistent pragmas and fixed schema.
// Dependencies: rand, rusqlite, serde
// ============================================================================

//! ## Overview
//! A tenant is an opaque 32-byte random identifier rendered as 64 lowercase
//! hex characters. Its storage is a single `SQLite` file named
//! `<id>.db` under the configured base directory, holding one `store` table.
//! Handles wrap one long-lived connection that is shared by every request
//! addressing the tenant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rand::RngCore;
use rand::rngs::OsRng;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use serde::Deserialize;
use serde::Serialize;

use crate::error::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of random bytes in a tenant identifier.
pub const TENANT_ID_BYTES: usize = 32;
/// Length of the hex-rendered tenant identifier.
pub const TENANT_ID_HEX_LEN: usize = TENANT_ID_BYTES * 2;
/// File extension for tenant database files.
pub const TENANT_FILE_EXTENSION: &str = "db";
/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Schema created in every freshly provisioned tenant file.
pub const STORE_SCHEMA_SQL: &str = "CREATE TABLE \"store\" (\"id\" INTEGER NOT NULL, \"type\" \
                                    TEXT, \"data\" BLOB, \"timestamp\" TIMESTAMP NOT NULL \
                                    DEFAULT CURRENT_TIMESTAMP, PRIMARY KEY(\"id\"))";

// ============================================================================
// SECTION: Tenant Identifier
// ============================================================================

/// Opaque tenant identifier (64 lowercase hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Generates a fresh identifier from 32 bytes of OS randomness.
    ///
    /// Uniqueness against already registered tenants is not checked; the
    /// collision probability is negligible.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TENANT_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex_encode(&bytes))
    }

    /// Parses a caller-supplied identifier.
    ///
    /// Returns `None` unless the input is exactly 64 hex characters. Upper
    /// case digits are folded to lower case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != TENANT_ID_HEX_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(value.to_ascii_lowercase()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the storage file path for this tenant under `base_dir`.
    #[must_use]
    pub fn file_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(format!("{}.{TENANT_FILE_EXTENSION}", self.0))
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (single file on disk between writes).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Storage settings shared by every tenant file.
#[derive(Debug, Clone)]
pub struct TenantStoreConfig {
    /// Directory holding one `<id>.db` file per tenant.
    pub base_dir: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    pub sync_mode: SqliteSyncMode,
}

impl TenantStoreConfig {
    /// Builds a config for `base_dir` with default engine settings.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Shared, long-lived connection to one tenant file.
///
/// # Invariants
/// - The registry holds the only long-lived clone per tenant id; request
///   clones are dropped when the request ends.
#[derive(Clone)]
pub struct TenantHandle {
    /// Tenant the connection belongs to.
    id: TenantId,
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl TenantHandle {
    /// Wraps an open connection.
    pub(crate) fn new(id: TenantId, connection: Connection) -> Self {
        Self {
            id,
            connection: Arc::new(Mutex::new(connection)),
        }
    }

    /// Returns the tenant identifier.
    #[must_use]
    pub const fn id(&self) -> &TenantId {
        &self.id
    }

    /// Locks the connection for exclusive use by one statement.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection.lock().map_err(|_| StoreError::Db("mutex poisoned".to_string()))
    }
}

impl fmt::Debug for TenantHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens a tenant connection with the configured pragmas.
pub(crate) fn open_connection(
    path: &Path,
    config: &TenantStoreConfig,
) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies journal, sync, and busy-timeout settings.
fn apply_pragmas(connection: &Connection, config: &TenantStoreConfig) -> Result<(), StoreError> {
    // journal_mode returns a row, so it goes through execute_batch.
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Creates the fixed `store` table inside one transaction.
pub(crate) fn create_store_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch(STORE_SCHEMA_SQL)?;
    tx.commit()?;
    Ok(())
}

/// Encodes bytes as a lowercase hex string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
