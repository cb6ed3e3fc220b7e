//! Delete descriptors and the per-call delete transaction request.
//!
//! # Invariants
//! - A table request requires a pre-delete read iff it carries a read command.
//! - Owner checks compare the row owner with the caller's owner id; any
//!   mismatch fails the whole request before a single row is deleted.

use super::command::{validate_identifier, SqlCommand};
use super::upsert::UpsertTableRequest;
use crate::changelog::{ChangeLogs, ChangeOperation};
use crate::error::{StoreError, StoreResult};
use crate::model::{OwnerId, RecordTypeId, UUID_COLUMN};

/// Delete descriptor for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteTableRequest {
    table: String,
    delete_command: SqlCommand,
    read: Option<PreDeleteRead>,
    id_column: String,
    owner_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct PreDeleteRead {
    record_type: RecordTypeId,
    command: SqlCommand,
}

impl DeleteTableRequest {
    pub fn new(table: impl Into<String>, delete_command: SqlCommand) -> Self {
        Self {
            table: table.into(),
            delete_command,
            read: None,
            id_column: UUID_COLUMN.to_string(),
            owner_column: None,
        }
    }

    /// Captures affected rows before deleting them, tagged with `record_type`.
    ///
    /// The read must project the id column (and the owner column when an
    /// owner check is requested).
    pub fn with_read(mut self, record_type: RecordTypeId, read_command: SqlCommand) -> Self {
        self.read = Some(PreDeleteRead {
            record_type,
            command: read_command,
        });
        self
    }

    /// Overrides the identifier column reported to the change log.
    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Verifies every captured row is owned by the caller.
    pub fn with_owner_check(mut self, owner_column: impl Into<String>) -> Self {
        self.owner_column = Some(owner_column.into());
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn delete_command(&self) -> &SqlCommand {
        &self.delete_command
    }

    pub fn requires_read(&self) -> bool {
        self.read.is_some()
    }

    pub fn read_command(&self) -> Option<&SqlCommand> {
        self.read.as_ref().map(|read| &read.command)
    }

    pub fn record_type(&self) -> Option<RecordTypeId> {
        self.read.as_ref().map(|read| read.record_type)
    }

    pub fn id_column_name(&self) -> &str {
        &self.id_column
    }

    pub fn requires_owner_check(&self) -> bool {
        self.owner_column.is_some()
    }

    pub fn owner_column_name(&self) -> Option<&str> {
        self.owner_column.as_deref()
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        validate_identifier("table", &self.table)?;
        validate_identifier("column", &self.id_column)?;
        if let Some(column) = &self.owner_column {
            validate_identifier("column", column)?;
            if self.read.is_none() {
                return Err(StoreError::InvalidArgument(format!(
                    "owner check on `{}` requires a read command",
                    self.table
                )));
            }
        }
        Ok(())
    }
}

/// All deletes of one call plus the change-log entries they produce.
#[derive(Debug, Clone)]
pub struct DeleteTransactionRequest {
    owner: OwnerId,
    requests: Vec<DeleteTableRequest>,
    change_logs: ChangeLogs,
}

impl DeleteTransactionRequest {
    /// Starts a delete issued by `owner`, the id owner checks compare against.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            requests: Vec::new(),
            change_logs: ChangeLogs::new(ChangeOperation::Delete),
        }
    }

    pub fn add(mut self, request: DeleteTableRequest) -> Self {
        self.requests.push(request);
        self
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn delete_table_requests(&self) -> &[DeleteTableRequest] {
        &self.requests
    }

    /// Records one captured row for change-log construction.
    ///
    /// `row_owner` falls back to the caller when the row carries none.
    pub fn on_record_fetched(
        &mut self,
        record_type: RecordTypeId,
        record_id: String,
        row_owner: Option<OwnerId>,
    ) {
        self.change_logs
            .add(record_type, record_id, row_owner.unwrap_or(self.owner));
    }

    /// Fails with `PermissionDenied` unless `row_owner` is the caller.
    pub fn enforce_owner_check(
        &self,
        table: &str,
        record_id: &str,
        row_owner: Option<OwnerId>,
    ) -> StoreResult<()> {
        if row_owner == Some(self.owner) {
            return Ok(());
        }
        Err(StoreError::PermissionDenied {
            table: table.to_string(),
            record_id: record_id.to_string(),
            owner: row_owner,
        })
    }

    pub fn change_log_upsert_requests(&self) -> Vec<UpsertTableRequest> {
        self.change_logs.upsert_requests()
    }

    /// Moves the table requests out so they can run while change logs are
    /// recorded on `self`.
    pub(crate) fn take_table_requests(&mut self) -> Vec<DeleteTableRequest> {
        std::mem::take(&mut self.requests)
    }
}
