// crates/blobvault-store-sqlite/src/executor.rs
// ============================================================================
// Module: Query Executor
// Description: Read/write classification and execution of caller statements.
// Purpose: Run untrusted statements against one tenant inside a transaction.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Statements are classified by a textual prefix heuristic: text whose first
//! seven bytes are `select ` (ASCII case-insensitive) is a read, everything
//! else is a write. The heuristic is part of the wire protocol, not a parse;
//! `"  SELECT ..."` or `"explain select ..."` are writes.
//!
//! Reads stream rows to a [`RowSink`] one at a time and commit only once the
//! cursor is exhausted. Writes report the engine's last-inserted row id, which
//! is meaningful only for single-row inserts. Any engine failure rolls the
//! transaction back before the error is returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::Row;
use rusqlite::params_from_iter;
use rusqlite::types::ValueRef;

use crate::error::StoreError;
use crate::tenant::TenantHandle;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix marking a statement as a read.
pub const READ_PREFIX: &str = "select ";
/// Columns consumed from every result row: id, type, data, timestamp.
pub const STORE_ROW_COLUMNS: usize = 4;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Statement classification derived from its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Streams rows back to the caller.
    Read,
    /// Executes and reports the last inserted row id.
    Write,
}

impl StatementKind {
    /// Classifies statement text by its leading `select ` token.
    #[must_use]
    pub fn classify(sql: &str) -> Self {
        match sql.get(..READ_PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(READ_PREFIX) => Self::Read,
            _ => Self::Write,
        }
    }
}

/// Ordered positional parameters, bound as blobs in upload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementParams(Vec<Vec<u8>>);

impl StatementParams {
    /// Creates an empty parameter list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends the next positional parameter.
    pub fn push(&mut self, value: impl Into<Vec<u8>>) {
        self.0.push(value.into());
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no parameters were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates parameters in binding order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.0.iter().map(Vec::as_slice)
    }
}

/// One result row in the fixed `id, type, data, timestamp` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRow {
    /// Row identifier.
    pub id: i64,
    /// Free-form type label, raw column bytes (empty when NULL).
    pub label: Vec<u8>,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Creation timestamp as stored by the engine.
    pub timestamp: Vec<u8>,
}

impl StoreRow {
    /// Reads the first four columns of a result row.
    fn from_row(row: &Row<'_>) -> Result<Self, StoreError> {
        let id: i64 = row.get(0)?;
        let label = value_bytes(row.get_ref(1)?);
        let data = value_bytes(row.get_ref(2)?);
        let timestamp = value_bytes(row.get_ref(3)?);
        Ok(Self {
            id,
            label,
            data,
            timestamp,
        })
    }
}

/// Receives read results row by row.
pub trait RowSink {
    /// Accepts one row. Returning an error aborts the read and rolls back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the consumer can no longer accept rows.
    fn push(&mut self, row: StoreRow) -> Result<(), StoreError>;
}

impl RowSink for Vec<StoreRow> {
    fn push(&mut self, row: StoreRow) -> Result<(), StoreError> {
        Vec::push(self, row);
        Ok(())
    }
}

/// Result of a successful statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Read completed; `rows` rows were delivered to the sink.
    Read {
        /// Rows delivered.
        rows: u64,
    },
    /// Write committed.
    Write {
        /// Engine last-inserted row id.
        row_id: i64,
    },
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Runs caller statements against tenant handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor;

impl QueryExecutor {
    /// Classifies and executes `sql` with positional blob parameters.
    ///
    /// Read rows are pushed to `sink`; writes ignore it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the statement fails to prepare or execute,
    /// when a read yields fewer than four columns, or when the sink aborts.
    /// The transaction has been rolled back by the time the error returns.
    pub fn execute(
        &self,
        handle: &TenantHandle,
        sql: &str,
        params: &StatementParams,
        sink: &mut dyn RowSink,
    ) -> Result<ExecOutcome, StoreError> {
        let mut guard = handle.lock()?;
        match StatementKind::classify(sql) {
            StatementKind::Read => {
                let rows = run_read(&mut guard, sql, params, sink)?;
                Ok(ExecOutcome::Read {
                    rows,
                })
            }
            StatementKind::Write => {
                let row_id = run_write(&mut guard, sql, params)?;
                Ok(ExecOutcome::Write {
                    row_id,
                })
            }
        }
    }
}

/// Streams a read statement into `sink`.
fn run_read(
    connection: &mut Connection,
    sql: &str,
    params: &StatementParams,
    sink: &mut dyn RowSink,
) -> Result<u64, StoreError> {
    let tx = connection.transaction()?;
    let count = {
        let mut stmt = tx.prepare(sql)?;
        if stmt.column_count() < STORE_ROW_COLUMNS {
            return Err(StoreError::Invalid(format!(
                "read statement must yield at least {STORE_ROW_COLUMNS} columns, got {}",
                stmt.column_count()
            )));
        }
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut count: u64 = 0;
        while let Some(row) = rows.next()? {
            sink.push(StoreRow::from_row(row)?)?;
            count += 1;
        }
        count
    };
    tx.commit()?;
    Ok(count)
}

/// Executes a write statement and returns the last inserted row id.
fn run_write(
    connection: &mut Connection,
    sql: &str,
    params: &StatementParams,
) -> Result<i64, StoreError> {
    let tx = connection.transaction()?;
    {
        let mut stmt = tx.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        // Step to completion; rows from write-classified statements are discarded.
        while rows.next()?.is_some() {}
    }
    let row_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(row_id)
}

/// Renders a column value as raw bytes.
fn value_bytes(value: ValueRef<'_>) -> Vec<u8> {
    match value {
        ValueRef::Null => Vec::new(),
        ValueRef::Integer(number) => number.to_string().into_bytes(),
        ValueRef::Real(number) => number.to_string().into_bytes(),
        ValueRef::Text(text) => text.to_vec(),
        ValueRef::Blob(blob) => blob.to_vec(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
