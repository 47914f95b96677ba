// crates/blobvault-config/src/lib.rs
// ============================================================================
// Module: Blobvault Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for blobvault.toml semantics.
// Dependencies: blobvault-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `blobvault-config` defines the configuration model for the blobvault
//! server: bind address, request body limit, shared credential, tenant
//! storage directory, and audit sink. Values load from an optional TOML file
//! and are then overridden by environment variables. Validation is strict
//! and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
