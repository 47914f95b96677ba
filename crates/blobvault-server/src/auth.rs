// crates/blobvault-server/src/auth.rs
// ============================================================================
// Module: Auth Gate
// Description: Shared-secret check for every request.
// Purpose: Reject callers whose credential does not match the configured token.
// Dependencies: subtle
// ============================================================================

//! ## Overview
//! The gate holds one process-wide secret. A missing credential is compared as
//! the empty string, so an empty secret accepts every caller; the server warns
//! and emits a security audit event at startup when that is the case.
//! Comparisons run in constant time over the raw token bytes, so a credential
//! that is not valid UTF-8 is simply a mismatch.

use std::fmt;

use subtle::ConstantTimeEq;

// ============================================================================
// SECTION: Auth Gate
// ============================================================================

/// Process-wide shared-secret gate.
#[derive(Clone)]
pub struct AuthGate {
    /// Configured secret; empty disables the check.
    secret: String,
}

impl AuthGate {
    /// Creates a gate for the given secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Returns true when the configured secret is empty.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.secret.is_empty()
    }

    /// Returns true when `presented` equals the configured secret byte for byte.
    #[must_use]
    pub fn authorize(&self, presented: Option<&[u8]>) -> bool {
        constant_time_eq(presented.unwrap_or_default(), self.secret.as_bytes())
    }
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate").field("disabled", &self.is_disabled()).finish_non_exhaustive()
    }
}

/// Compares two byte slices in constant time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
