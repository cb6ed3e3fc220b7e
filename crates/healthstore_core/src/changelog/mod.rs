//! Change-log audit trail written alongside every mutation.
//!
//! # Responsibility
//! - Accumulate entries while a write request executes.
//! - Render them as upserts into `change_logs`, persisted in the same unit
//!   of work as the mutation they describe.
//! - Provide paginated reads and retention deletes over the log.
//!
//! # Invariants
//! - Entries are append-only; only the retention sweep removes them.
//! - All entries of one request share the request's change time.

mod tokens;

pub use tokens::{ChangeLogTokenRequest, CHANGE_LOG_TOKENS_TABLE, CHANGE_LOG_TOKEN_RETENTION_DAYS};

use crate::error::{StoreError, StoreResult};
use crate::model::{now_epoch_ms, retention_cutoff_ms, OwnerId, RecordTypeId, RowId};
use crate::request::{DeleteTableRequest, ReadTableRequest, SqlCommand, UpsertTableRequest};
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const CHANGE_LOGS_TABLE: &str = "change_logs";

/// Change-log rows older than this many days are pruned.
pub const CHANGE_LOG_RETENTION_DAYS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    /// Record was inserted or replaced by an update.
    Insert,
    Delete,
}

impl ChangeOperation {
    fn to_db(self) -> i64 {
        match self {
            Self::Insert => 0,
            Self::Delete => 1,
        }
    }

    fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Insert),
            1 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One persisted audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub row_id: RowId,
    pub record_type: RecordTypeId,
    pub operation: ChangeOperation,
    pub uuid: String,
    pub owner: OwnerId,
    /// Unix epoch milliseconds.
    pub change_time: i64,
}

/// Entries staged by one write request.
#[derive(Debug, Clone)]
pub struct ChangeLogs {
    operation: ChangeOperation,
    change_time: i64,
    entries: Vec<(RecordTypeId, String, OwnerId)>,
}

impl ChangeLogs {
    pub fn new(operation: ChangeOperation) -> Self {
        Self::at(operation, now_epoch_ms())
    }

    pub fn at(operation: ChangeOperation, change_time: i64) -> Self {
        Self {
            operation,
            change_time,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, record_type: RecordTypeId, uuid: String, owner: OwnerId) {
        self.entries.push((record_type, uuid, owner));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn upsert_requests(&self) -> Vec<UpsertTableRequest> {
        self.entries
            .iter()
            .map(|(record_type, uuid, owner)| {
                UpsertTableRequest::new(CHANGE_LOGS_TABLE)
                    .value("record_type", i64::from(*record_type))
                    .value("operation", self.operation.to_db())
                    .value("uuid", uuid.clone())
                    .value("app_info_id", *owner)
                    .value("change_time", self.change_time)
            })
            .collect()
    }
}

/// Reads and retention commands over `change_logs`.
pub struct ChangeLogsHelper;

impl ChangeLogsHelper {
    /// Entries with `row_id >= start_row_id`, optionally limited to record
    /// types, ordered by row id. Pair with a paginated read.
    pub fn read_request_from(
        start_row_id: RowId,
        record_types: &[RecordTypeId],
        page_size: usize,
    ) -> ReadTableRequest<ChangeLogEntry> {
        let mut sql = format!(
            "SELECT row_id, record_type, operation, uuid, app_info_id, change_time \
             FROM {CHANGE_LOGS_TABLE} WHERE row_id >= ?"
        );
        let mut params = vec![Value::Integer(start_row_id)];
        if !record_types.is_empty() {
            let placeholders = vec!["?"; record_types.len()].join(", ");
            sql.push_str(&format!(" AND record_type IN ({placeholders})"));
            params.extend(
                record_types
                    .iter()
                    .map(|record_type| Value::Integer(i64::from(*record_type))),
            );
        }
        sql.push_str(" ORDER BY row_id ASC");

        ReadTableRequest::new(
            CHANGE_LOGS_TABLE,
            SqlCommand::with_params(sql, params),
            decode_change_log_entry,
        )
        .page_size(page_size)
    }

    /// Deletes entries older than [`CHANGE_LOG_RETENTION_DAYS`] from `now_ms`.
    pub fn retention_delete_request(now_ms: i64) -> DeleteTableRequest {
        let cutoff = retention_cutoff_ms(now_ms, CHANGE_LOG_RETENTION_DAYS);
        DeleteTableRequest::new(
            CHANGE_LOGS_TABLE,
            SqlCommand::new(format!(
                "DELETE FROM {CHANGE_LOGS_TABLE} WHERE change_time < ?"
            ))
            .bind(cutoff),
        )
    }
}

fn decode_change_log_entry(row: &Row<'_>) -> StoreResult<ChangeLogEntry> {
    let operation_value: i64 = row.get("operation")?;
    let operation = ChangeOperation::from_db(operation_value).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid operation `{operation_value}` in {CHANGE_LOGS_TABLE}.operation"
        ))
    })?;
    Ok(ChangeLogEntry {
        row_id: row.get("row_id")?,
        record_type: row.get("record_type")?,
        operation,
        uuid: row.get("uuid")?,
        owner: row.get("app_info_id")?,
        change_time: row.get("change_time")?,
    })
}
