// crates/blobvault-server/src/codec.rs
// ============================================================================
// Module: Wire Codec
// Description: Multipart request parsing and multipart row encoding.
// Purpose: Translate between form-data bodies and store-level types.
// Dependencies: axum, bytes, rand, blobvault-store-sqlite
// ============================================================================

//! ## Overview
//! Requests carry three text fields (`token`, `dbId`, `sqlQuery`) and any
//! number of `sqlArg` parts. For text fields the first occurrence wins; they
//! are checked for UTF-8 only when used, after authorization. `sqlArg` parts
//! become positional parameters in upload order. Unknown fields are skipped.
//!
//! Read responses are `multipart/form-data` bodies with four parts per row
//! (`id`, `type`, `data`, `timestamp`). The layout matches the usual
//! form-data writer: the first part opens with `--boundary`, later parts with
//! CRLF plus `--boundary`, and the body always ends with CRLF plus
//! `--boundary--` and CRLF.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use blobvault_store_sqlite::StatementParams;
use blobvault_store_sqlite::StoreRow;
use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::RequestError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Credential field name.
pub const FIELD_TOKEN: &str = "token";
/// Tenant identifier field name.
pub const FIELD_DB_ID: &str = "dbId";
/// Statement text field name.
pub const FIELD_SQL_QUERY: &str = "sqlQuery";
/// Positional argument part name.
pub const FIELD_SQL_ARG: &str = "sqlArg";
/// Random bytes used for a response boundary.
pub const BOUNDARY_BYTES: usize = 30;
/// Field names emitted for every row, in order.
pub const ROW_FIELDS: [&str; 4] = ["id", "type", "data", "timestamp"];

// ============================================================================
// SECTION: Request Parsing
// ============================================================================

/// Parsed multipart request.
///
/// Text fields are kept as raw bytes so nothing about them is judged before
/// the credential is checked; [`BlobRequest::tenant`] and
/// [`BlobRequest::statement`] decode them afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobRequest {
    /// Presented credential.
    pub token: Option<Bytes>,
    /// Tenant identifier; absent or empty selects provisioning.
    pub db_id: Option<Bytes>,
    /// Statement text.
    pub sql_query: Option<Bytes>,
    /// Positional statement arguments in upload order.
    pub args: StatementParams,
}

impl BlobRequest {
    /// Returns the tenant identifier when present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadField`] when `dbId` is not UTF-8.
    pub fn tenant(&self) -> Result<Option<&str>, RequestError> {
        let Some(raw) = self.db_id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        decode_text(FIELD_DB_ID, raw).map(Some)
    }

    /// Returns the statement text.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::BadField`] when `sqlQuery` is missing or not
    /// UTF-8.
    pub fn statement(&self) -> Result<&str, RequestError> {
        let raw = self
            .sql_query
            .as_deref()
            .ok_or_else(|| RequestError::BadField(format!("{FIELD_SQL_QUERY} is required")))?;
        decode_text(FIELD_SQL_QUERY, raw)
    }
}

/// Decodes a text field, naming it in the error.
fn decode_text<'a>(name: &str, raw: &'a [u8]) -> Result<&'a str, RequestError> {
    std::str::from_utf8(raw).map_err(|_| RequestError::BadField(format!("{name} must be utf-8")))
}

/// Reads every part of a multipart body into a [`BlobRequest`].
///
/// # Errors
///
/// Returns [`RequestError::TooLarge`] when the body limit is exceeded,
/// [`RequestError::ParamRead`] when an argument part cannot be read, and
/// [`RequestError::BadField`] for malformed envelopes.
pub async fn read_request(multipart: &mut Multipart) -> Result<BlobRequest, RequestError> {
    let mut request = BlobRequest::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| classify_multipart_error(&err, RequestError::BadField))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let slot = match name.as_str() {
            FIELD_SQL_ARG => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| classify_multipart_error(&err, RequestError::ParamRead))?;
                request.args.push(bytes.to_vec());
                continue;
            }
            FIELD_TOKEN => &mut request.token,
            FIELD_DB_ID => &mut request.db_id,
            FIELD_SQL_QUERY => &mut request.sql_query,
            _ => continue,
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|err| classify_multipart_error(&err, RequestError::BadField))?;
        if slot.is_none() {
            *slot = Some(bytes);
        }
    }
    Ok(request)
}

/// Maps a multipart failure, preferring the body-limit status.
fn classify_multipart_error(
    err: &MultipartError,
    otherwise: fn(String) -> RequestError,
) -> RequestError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RequestError::TooLarge
    } else {
        otherwise(err.body_text())
    }
}

// ============================================================================
// SECTION: Response Encoding
// ============================================================================

/// Incremental `multipart/form-data` writer for result rows.
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    /// Boundary shared by every part.
    boundary: String,
    /// Whether any part has been written.
    started: bool,
}

impl MultipartEncoder {
    /// Creates an encoder with a fresh random boundary.
    #[must_use]
    pub fn new() -> Self {
        let mut bytes = [0u8; BOUNDARY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let mut boundary = String::with_capacity(BOUNDARY_BYTES * 2);
        for byte in bytes {
            let _ = write!(boundary, "{byte:02x}");
        }
        Self::with_boundary(boundary)
    }

    /// Creates an encoder with a fixed boundary.
    #[must_use]
    pub const fn with_boundary(boundary: String) -> Self {
        Self {
            boundary,
            started: false,
        }
    }

    /// Returns the boundary string.
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Returns the `Content-Type` header value for the response.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encodes one row as four consecutive parts.
    pub fn encode_row(&mut self, row: &StoreRow) -> Bytes {
        let id = row.id.to_string();
        let values: [&[u8]; 4] =
            [id.as_bytes(), row.label.as_slice(), row.data.as_slice(), row.timestamp.as_slice()];
        let payload: usize = values.iter().map(|value| value.len()).sum();
        let mut buf = BytesMut::with_capacity(payload + 4 * (self.boundary.len() + 64));
        for (name, value) in ROW_FIELDS.iter().zip(values) {
            self.write_part_header(&mut buf, name);
            buf.put_slice(value);
        }
        buf.freeze()
    }

    /// Returns the closing delimiter.
    #[must_use]
    pub fn finish(&self) -> Bytes {
        Bytes::from(format!("\r\n--{}--\r\n", self.boundary))
    }

    /// Writes the delimiter and headers for the next part.
    fn write_part_header(&mut self, buf: &mut BytesMut, name: &str) {
        if self.started {
            buf.put_slice(b"\r\n");
        }
        self.started = true;
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"\r\nContent-Disposition: form-data; name=\"");
        buf.put_slice(name.as_bytes());
        buf.put_slice(b"\"\r\n\r\n");
    }
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
