//! Change-log request tokens: a caller's bookmark into `change_logs`.
//!
//! A token row remembers who asked, which record types they follow and the
//! change-log high-water mark at issue time. The token value handed out is
//! the token row's own `row_id`.

use crate::error::{StoreError, StoreResult};
use crate::model::{now_epoch_ms, retention_cutoff_ms, OwnerId, RecordTypeId, RowId};
use crate::request::{DeleteTableRequest, ReadTableRequest, SqlCommand, UpsertTableRequest};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

pub const CHANGE_LOG_TOKENS_TABLE: &str = "change_log_request_tokens";

/// Token rows older than this many days are pruned with the change logs.
pub const CHANGE_LOG_TOKEN_RETENTION_DAYS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogTokenRequest {
    pub owner: OwnerId,
    pub record_types: Vec<RecordTypeId>,
    /// Last change-log row id the holder has already seen.
    pub change_log_row_id: RowId,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl ChangeLogTokenRequest {
    pub fn new(owner: OwnerId, record_types: Vec<RecordTypeId>, change_log_row_id: RowId) -> Self {
        Self {
            owner,
            record_types,
            change_log_row_id,
            created_at: now_epoch_ms(),
        }
    }

    /// First change-log row id not yet seen by the token holder.
    pub fn next_change_row_id(&self) -> RowId {
        self.change_log_row_id.saturating_add(1)
    }

    pub fn upsert_request(&self) -> UpsertTableRequest {
        UpsertTableRequest::new(CHANGE_LOG_TOKENS_TABLE)
            .value("app_info_id", self.owner)
            .value("record_types", encode_record_types(&self.record_types))
            .value("row_id_change_logs", self.change_log_row_id)
            .value("created_at", self.created_at)
    }

    /// Reads back the token issued as `token`.
    pub fn read_request(token: RowId) -> ReadTableRequest<ChangeLogTokenRequest> {
        ReadTableRequest::new(
            CHANGE_LOG_TOKENS_TABLE,
            SqlCommand::new(format!(
                "SELECT app_info_id, record_types, row_id_change_logs, created_at \
                 FROM {CHANGE_LOG_TOKENS_TABLE} WHERE row_id = ?"
            ))
            .bind(token),
            decode_token_row,
        )
        .page_size(1)
    }

    pub fn retention_delete_request(now_ms: i64) -> DeleteTableRequest {
        let cutoff = retention_cutoff_ms(now_ms, CHANGE_LOG_TOKEN_RETENTION_DAYS);
        DeleteTableRequest::new(
            CHANGE_LOG_TOKENS_TABLE,
            SqlCommand::new(format!(
                "DELETE FROM {CHANGE_LOG_TOKENS_TABLE} WHERE created_at < ?"
            ))
            .bind(cutoff),
        )
    }
}

fn encode_record_types(record_types: &[RecordTypeId]) -> String {
    record_types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_record_types(value: &str) -> StoreResult<Vec<RecordTypeId>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|part| {
            part.trim().parse::<RecordTypeId>().map_err(|_| {
                StoreError::InvalidData(format!(
                    "invalid record type `{part}` in {CHANGE_LOG_TOKENS_TABLE}.record_types"
                ))
            })
        })
        .collect()
}

fn decode_token_row(row: &Row<'_>) -> StoreResult<ChangeLogTokenRequest> {
    let record_types: String = row.get("record_types")?;
    Ok(ChangeLogTokenRequest {
        owner: row.get("app_info_id")?,
        record_types: decode_record_types(&record_types)?,
        change_log_row_id: row.get("row_id_change_logs")?,
        created_at: row.get("created_at")?,
    })
}
