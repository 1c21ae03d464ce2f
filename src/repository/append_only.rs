//! Write guard for append-only tables.
//!
//! Every write against an append-only table passes through [`admit`] before
//! it reaches storage. Only inserts get through; everything else fails with
//! [`AppError::AppendOnlyViolation`], regardless of how old the target row is.

use crate::error::{AppError, Result};
use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOperation {
    Insert,
    Update,
    Replace,
    Delete,
    UpdateMany,
    DeleteMany,
}

impl WriteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOperation::Insert => "insert",
            WriteOperation::Update => "update",
            WriteOperation::Replace => "replace",
            WriteOperation::Delete => "delete",
            WriteOperation::UpdateMany => "update_many",
            WriteOperation::DeleteMany => "delete_many",
        }
    }
}

pub fn violation(table: &'static str, operation: &'static str) -> AppError {
    tracing::warn!(table, operation, "Rejected write against append-only table");
    telemetry::metrics::record_append_only_violation(table, operation);
    AppError::AppendOnlyViolation { table, operation }
}

/// Let inserts through, reject everything else.
pub fn admit(table: &'static str, operation: WriteOperation) -> Result<()> {
    match operation {
        WriteOperation::Insert => Ok(()),
        other => Err(violation(table, other.as_str())),
    }
}
