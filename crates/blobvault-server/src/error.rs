// crates/blobvault-server/src/error.rs
// ============================================================================
// Module: Request Errors
// Description: Per-request failure taxonomy and its HTTP status mapping.
// Purpose: Keep every failure scoped to the request that caused it.
// Dependencies: axum, thiserror
// ============================================================================

//! ## Overview
//! Callers distinguish failures by status code only; every error response has
//! an empty body. Engine failures map to `500` and never stop the process.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use thiserror::Error;

/// Failure of a single request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Wrong method, content type, or unreadable multipart envelope.
    #[error("request must be a multipart/form-data POST")]
    BadShape,
    /// Credential missing or not equal to the configured secret.
    #[error("unauthorized")]
    Unauthorized,
    /// Tenant identifier was never provisioned.
    #[error("unknown tenant")]
    UnknownTenant,
    /// A text field was missing or malformed.
    #[error("invalid field: {0}")]
    BadField(String),
    /// An uploaded statement argument could not be read.
    #[error("parameter read failed: {0}")]
    ParamRead(String),
    /// Request body exceeded the configured limit.
    #[error("request body too large")]
    TooLarge,
    /// Statement failed; its transaction was rolled back.
    #[error("statement failed: {0}")]
    Execution(String),
    /// Provisioning, worker, or other internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RequestError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadShape | Self::UnknownTenant | Self::BadField(_) | Self::ParamRead(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Execution(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a stable label for audit records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadShape => "bad_shape",
            Self::Unauthorized => "unauthorized",
            Self::UnknownTenant => "unknown_tenant",
            Self::BadField(_) => "bad_field",
            Self::ParamRead(_) => "param_read",
            Self::TooLarge => "too_large",
            Self::Execution(_) => "execution",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}
