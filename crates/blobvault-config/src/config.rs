// crates/blobvault-config/src/config.rs
// ============================================================================
// Module: Blobvault Configuration
// Description: Configuration loading and validation for the blobvault server.
// Purpose: Provide strict, fail-closed config parsing with env overrides.
// Dependencies: blobvault-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Resolution order: an explicit path, then `BLOBVAULT_CONFIG`, then
//! `blobvault.toml` in the working directory when present, then built-in
//! defaults. After the file is parsed, `BLOBVAULT_DB_DIR` and
//! `BLOBVAULT_AUTH_TOKEN` override the storage directory and shared secret;
//! empty environment values are ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use blobvault_store_sqlite::SqliteStoreMode;
use blobvault_store_sqlite::SqliteSyncMode;
use blobvault_store_sqlite::TenantStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "blobvault.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "BLOBVAULT_CONFIG";
/// Environment variable overriding the tenant storage directory.
pub const DB_DIR_ENV_VAR: &str = "BLOBVAULT_DB_DIR";
/// Environment variable overriding the shared credential.
pub const AUTH_TOKEN_ENV_VAR: &str = "BLOBVAULT_AUTH_TOKEN";
/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default tenant storage directory.
pub const DEFAULT_DB_DIR: &str = "dbs";
/// Default maximum request body size (multipart parse limit).
pub const DEFAULT_MAX_BODY_BYTES: usize = 512_000_000;
/// Upper bound for the request body limit.
pub const MAX_BODY_BYTES_LIMIT: usize = 2 * 1024 * 1024 * 1024;
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of the shared credential.
pub const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum `SQLite` busy timeout in milliseconds.
pub const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default `SQLite` busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Blobvault server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlobvaultConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Tenant storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Path the configuration was loaded from (not serialized).
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Shared credential compared against the `token` form field.
    #[serde(default)]
    pub auth_token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            auth_token: String::new(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is invalid: {}", self.bind)))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        if self.auth_token.len() > MAX_AUTH_TOKEN_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "server.auth_token exceeds {MAX_AUTH_TOKEN_LENGTH} bytes"
            )));
        }
        Ok(())
    }
}

/// Tenant storage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding one database file per tenant.
    #[serde(default = "default_db_dir")]
    pub base_dir: PathBuf,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_db_dir(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StorageConfig {
    /// Builds the store configuration consumed by the tenant registry.
    #[must_use]
    pub fn to_store_config(&self) -> TenantStoreConfig {
        TenantStoreConfig {
            base_dir: self.base_dir.clone(),
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }

    /// Validates storage settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_field("storage.base_dir", &self.base_dir)?;
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "storage.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// Audit logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Enables audit events.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional JSON-lines file; stderr when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_field("audit.path", path)?;
        }
        Ok(())
    }
}

impl BlobvaultConfig {
    /// Loads configuration using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Loads configuration with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env(
        path: Option<&Path>,
        env_lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path, &env_lookup)? {
            Some(resolved) => Self::from_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_env_overrides(&env_lookup);
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML string without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file.
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        validate_path_field("config path", path)?;
        let bytes = fs::read(path)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Applies `BLOBVAULT_DB_DIR` and `BLOBVAULT_AUTH_TOKEN` overrides.
    pub fn apply_env_overrides(&mut self, env_lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = env_lookup(DB_DIR_ENV_VAR).filter(|value| !value.is_empty()) {
            self.storage.base_dir = PathBuf::from(dir);
        }
        if let Some(token) = env_lookup(AUTH_TOKEN_ENV_VAR).filter(|value| !value.is_empty()) {
            self.server.auth_token = token;
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.storage.validate()?;
        self.audit.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path; `None` means built-in defaults.
fn resolve_path(
    path: Option<&Path>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(env_path) = env_lookup(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(Some(PathBuf::from(env_path)));
    }
    let default_path = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default_path.is_file().then_some(default_path))
}

/// Validates a path against length limits.
fn validate_path_field(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Returns the default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Returns the default request body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Returns the default tenant storage directory.
fn default_db_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DB_DIR)
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Serde default helper for `true`.
const fn default_true() -> bool {
    true
}
