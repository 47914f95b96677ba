// crates/blobvault-store-sqlite/src/registry.rs
// ============================================================================
// Module: Tenant Registry
// Description: Owned map from tenant identifier to open tenant handle.
// Purpose: Enumerate persisted tenants at startup and provision new ones.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! The registry is constructed once at startup and shared by reference with
//! the request router. Registrations are append-only: handles are inserted on
//! enumeration or provisioning and never removed or replaced, so lookups take
//! a shared read lock and provisioning takes the write lock only for the
//! final insert.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::tenant::TENANT_FILE_EXTENSION;
use crate::tenant::TenantHandle;
use crate::tenant::TenantId;
use crate::tenant::TenantStoreConfig;
use crate::tenant::create_store_schema;
use crate::tenant::open_connection;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of a directory enumeration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationReport {
    /// Tenants registered by this pass.
    pub registered: Vec<TenantId>,
    /// `.db` files ignored because their stem is not a tenant id.
    pub skipped: Vec<PathBuf>,
}

/// Registry of open tenant handles.
pub struct TenantRegistry {
    /// Storage settings applied to every tenant connection.
    config: TenantStoreConfig,
    /// Registered handles keyed by tenant id.
    tenants: RwLock<HashMap<TenantId, TenantHandle>>,
}

impl TenantRegistry {
    /// Creates an empty registry without touching the filesystem.
    #[must_use]
    pub fn new(config: TenantStoreConfig) -> Self {
        Self {
            config,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Creates the base directory when missing and enumerates it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the directory cannot be created or listed,
    /// or when a persisted tenant file cannot be opened.
    pub fn open(config: TenantStoreConfig) -> Result<(Self, EnumerationReport), StoreError> {
        fs::create_dir_all(&config.base_dir).map_err(|err| {
            StoreError::Io(format!("create {}: {err}", config.base_dir.display()))
        })?;
        let registry = Self::new(config);
        let report = registry.enumerate()?;
        Ok((registry, report))
    }

    /// Returns the base directory holding tenant files.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Scans the base directory and registers every persisted tenant file.
    ///
    /// Tenants that are already registered keep their existing handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the directory cannot be listed or a tenant
    /// file cannot be opened.
    pub fn enumerate(&self) -> Result<EnumerationReport, StoreError> {
        let entries = fs::read_dir(&self.config.base_dir).map_err(|err| {
            StoreError::Io(format!("list {}: {err}", self.config.base_dir.display()))
        })?;
        let mut report = EnumerationReport::default();
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::Io(err.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(TENANT_FILE_EXTENSION) {
                continue;
            }
            let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();
            match TenantId::parse(stem) {
                Some(id) if id.as_str() == stem => found.push((id, path)),
                _ => report.skipped.push(path),
            }
        }
        found.sort();

        let mut opened = Vec::with_capacity(found.len());
        for (id, path) in found {
            if self.contains(&id)? {
                continue;
            }
            let connection = open_connection(&path, &self.config)?;
            opened.push(TenantHandle::new(id, connection));
        }

        let mut guard = self
            .tenants
            .write()
            .map_err(|_| StoreError::Db("registry lock poisoned".to_string()))?;
        for handle in opened {
            let id = handle.id().clone();
            if let std::collections::hash_map::Entry::Vacant(slot) = guard.entry(id.clone()) {
                slot.insert(handle);
                report.registered.push(id);
            }
        }
        drop(guard);
        Ok(report)
    }

    /// Creates a new tenant file with the fixed schema and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file cannot be created or the schema
    /// statement fails. A half-created file is removed before returning.
    pub fn provision(&self) -> Result<(TenantId, TenantHandle), StoreError> {
        let id = TenantId::generate();
        let path = id.file_path(&self.config.base_dir);
        let connection = match open_connection(&path, &self.config).and_then(|mut connection| {
            create_store_schema(&mut connection)?;
            Ok(connection)
        }) {
            Ok(connection) => connection,
            Err(err) => {
                remove_tenant_files(&path);
                return Err(err);
            }
        };
        let handle = TenantHandle::new(id.clone(), connection);
        self.tenants
            .write()
            .map_err(|_| StoreError::Db("registry lock poisoned".to_string()))?
            .insert(id.clone(), handle.clone());
        Ok((id, handle))
    }

    /// Looks up a handle by caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the identifier was never
    /// registered or is not a well-formed tenant id.
    pub fn lookup(&self, id: &str) -> Result<TenantHandle, StoreError> {
        let Some(parsed) = TenantId::parse(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        self.tenants
            .read()
            .map_err(|_| StoreError::Db("registry lock poisoned".to_string()))?
            .get(&parsed)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(parsed.to_string()))
    }

    /// Returns every registered tenant id in sorted order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the registry lock is poisoned.
    pub fn tenant_ids(&self) -> Result<Vec<TenantId>, StoreError> {
        let guard = self
            .tenants
            .read()
            .map_err(|_| StoreError::Db("registry lock poisoned".to_string()))?;
        let mut ids: Vec<TenantId> = guard.keys().cloned().collect();
        drop(guard);
        ids.sort();
        Ok(ids)
    }

    /// Returns the number of registered tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.read().map_or(0, |guard| guard.len())
    }

    /// Returns true when no tenant is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when `id` already has a handle.
    fn contains(&self, id: &TenantId) -> Result<bool, StoreError> {
        Ok(self
            .tenants
            .read()
            .map_err(|_| StoreError::Db("registry lock poisoned".to_string()))?
            .contains_key(id))
    }
}

/// Best-effort removal of a tenant file and its journal side files.
fn remove_tenant_files(path: &Path) {
    let _ = fs::remove_file(path);
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut side = path.as_os_str().to_os_string();
        side.push(suffix);
        let _ = fs::remove_file(PathBuf::from(side));
    }
}
