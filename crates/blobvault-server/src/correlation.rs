// crates/blobvault-server/src/correlation.rs
// ============================================================================
// Module: Request Correlation
// Description: Server-issued identifiers for every inbound request.
// Purpose: Tie a response header to the matching audit record.
// Dependencies: rand
// ============================================================================

//! ## Overview
//! Identifiers combine a boot-scoped random value with a monotonic counter, so
//! they are unique within the process lifetime and distinguishable across
//! restarts. Callers never supply correlation ids; the server only issues them.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::RngCore;
use rand::rngs::OsRng;

/// Response header carrying the server-issued correlation id.
pub const SERVER_CORRELATION_HEADER: &str = "x-server-correlation-id";
/// Prefix for issued correlation ids.
pub const SERVER_CORRELATION_PREFIX: &str = "bv";

/// Boot-scoped correlation id generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    /// Prefix included in every id.
    prefix: &'static str,
    /// Random value fixed at construction.
    boot_id: u64,
    /// Next sequence number.
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a generator with the given prefix.
    #[must_use]
    pub fn new(prefix: &'static str) -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self {
            prefix,
            boot_id: u64::from_be_bytes(bytes),
            counter: AtomicU64::new(1),
        }
    }

    /// Issues the next correlation id.
    #[must_use]
    pub fn issue(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:016x}-{:016x}", self.prefix, self.boot_id, seq)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new(SERVER_CORRELATION_PREFIX)
    }
}
