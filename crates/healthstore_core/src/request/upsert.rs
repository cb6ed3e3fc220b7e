//! Insert/update descriptors for one table row and its owned child rows.
//!
//! # Responsibility
//! - Carry ordered column values, child requests and the conflict policy.
//! - Render the INSERT/UPDATE/DELETE statements the manager executes.
//!
//! # Invariants
//! - A child request never carries its parent key; the manager supplies it
//!   once the parent row id is known.
//! - Setting a column twice keeps one entry with the latest value.

use super::command::{validate_identifier, SqlCommand, WhereClauses};
use crate::changelog::{ChangeLogs, ChangeOperation};
use crate::error::{StoreError, StoreResult};
use crate::model::{OwnerId, RecordTypeId, RowId, ROW_ID_COLUMN, UUID_COLUMN};
use rusqlite::types::Value;
use uuid::Uuid;

/// Store behavior when an insert hits a uniqueness constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail the statement, which aborts the whole unit of work.
    #[default]
    Abort,
    /// Replace the conflicting row. Only meaningful for unique columns.
    Replace,
}

/// Child request paired with the column that references its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildUpsertRequest {
    parent_key_column: String,
    request: UpsertTableRequest,
}

impl ChildUpsertRequest {
    pub fn parent_key_column(&self) -> &str {
        &self.parent_key_column
    }

    pub fn request(&self) -> &UpsertTableRequest {
        &self.request
    }
}

/// Upsert descriptor for a single table row.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertTableRequest {
    table: String,
    values: Vec<(String, Value)>,
    children: Vec<ChildUpsertRequest>,
    conflict: ConflictPolicy,
    where_clauses: WhereClauses,
}

impl UpsertTableRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: Vec::new(),
            children: Vec::new(),
            conflict: ConflictPolicy::default(),
            where_clauses: WhereClauses::default(),
        }
    }

    /// Sets one column value, replacing an earlier value for the same column.
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_value(column, value);
        self
    }

    pub fn set_value(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
    }

    /// Adds an owned child row; `parent_key_column` receives the parent row id.
    pub fn child(
        mut self,
        parent_key_column: impl Into<String>,
        request: UpsertTableRequest,
    ) -> Self {
        self.children.push(ChildUpsertRequest {
            parent_key_column: parent_key_column.into(),
            request,
        });
        self
    }

    pub fn conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    /// Sets the natural-key match used by updates.
    pub fn where_clauses(mut self, where_clauses: WhereClauses) -> Self {
        self.where_clauses = where_clauses;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    pub fn value_of(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn children(&self) -> &[ChildUpsertRequest] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict
    }

    pub fn where_clause(&self) -> &WhereClauses {
        &self.where_clauses
    }

    /// Natural key used in `RecordNotFound` diagnostics.
    pub fn natural_key(&self) -> String {
        if self.where_clauses.is_empty() {
            return match self.value_of(UUID_COLUMN) {
                Some(value) => format!(
                    "{UUID_COLUMN}={}",
                    super::command::describe_value(value)
                ),
                None => "<no key>".to_string(),
            };
        }
        self.where_clauses.describe()
    }

    pub(crate) fn insert_command(
        &self,
        conflict: ConflictPolicy,
        parent_key: Option<(&str, RowId)>,
    ) -> StoreResult<SqlCommand> {
        validate_identifier("table", &self.table)?;

        let mut columns = Vec::with_capacity(self.values.len() + 1);
        let mut params = Vec::with_capacity(self.values.len() + 1);
        for (column, value) in &self.values {
            if parent_key.is_some_and(|(key_column, _)| key_column == column.as_str()) {
                continue;
            }
            validate_identifier("column", column)?;
            columns.push(column.as_str());
            params.push(value.clone());
        }
        if let Some((key_column, row_id)) = parent_key {
            validate_identifier("column", key_column)?;
            columns.push(key_column);
            params.push(Value::Integer(row_id));
        }

        let verb = match conflict {
            ConflictPolicy::Abort => "INSERT",
            ConflictPolicy::Replace => "INSERT OR REPLACE",
        };
        if columns.is_empty() {
            return Ok(SqlCommand::new(format!(
                "{verb} INTO {} DEFAULT VALUES",
                self.table
            )));
        }
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(SqlCommand::with_params(
            format!(
                "{verb} INTO {} ({}) VALUES ({placeholders})",
                self.table,
                columns.join(", ")
            ),
            params,
        ))
    }

    pub(crate) fn update_command(&self) -> StoreResult<SqlCommand> {
        validate_identifier("table", &self.table)?;
        let (predicate, where_params) = self.match_predicate()?;
        if self.values.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "update for `{}` carries no column values",
                self.table
            )));
        }

        let mut assignments = Vec::with_capacity(self.values.len());
        let mut params = Vec::with_capacity(self.values.len() + where_params.len());
        for (column, value) in &self.values {
            validate_identifier("column", column)?;
            assignments.push(format!("{column} = ?"));
            params.push(value.clone());
        }
        params.extend(where_params);
        Ok(SqlCommand::with_params(
            format!(
                "UPDATE {} SET {} WHERE {predicate}",
                self.table,
                assignments.join(", ")
            ),
            params,
        ))
    }

    pub(crate) fn delete_matching_command(&self) -> StoreResult<SqlCommand> {
        validate_identifier("table", &self.table)?;
        let (predicate, params) = self.match_predicate()?;
        Ok(SqlCommand::with_params(
            format!("DELETE FROM {} WHERE {predicate}", self.table),
            params,
        ))
    }

    pub(crate) fn select_matching_row_ids_command(&self) -> StoreResult<SqlCommand> {
        validate_identifier("table", &self.table)?;
        let (predicate, params) = self.match_predicate()?;
        Ok(SqlCommand::with_params(
            format!(
                "SELECT {ROW_ID_COLUMN} FROM {} WHERE {predicate} ORDER BY {ROW_ID_COLUMN}",
                self.table
            ),
            params,
        ))
    }

    fn match_predicate(&self) -> StoreResult<(String, Vec<Value>)> {
        if self.where_clauses.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "update for `{}` has no where clauses",
                self.table
            )));
        }
        self.where_clauses.to_sql()
    }
}

/// Records written together in one call, with their change-log entries.
#[derive(Debug, Clone)]
pub struct UpsertTransactionRequest {
    owner: OwnerId,
    requests: Vec<UpsertTableRequest>,
    uuids: Vec<String>,
    change_logs: ChangeLogs,
}

impl UpsertTransactionRequest {
    /// Starts a request written by `owner`.
    pub fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            requests: Vec::new(),
            uuids: Vec::new(),
            change_logs: ChangeLogs::new(ChangeOperation::Insert),
        }
    }

    /// Adds one record and returns its stable uuid.
    ///
    /// A text `uuid` column already present on `request` is kept; otherwise
    /// a fresh v4 uuid is generated and written into the column.
    pub fn add_record(&mut self, record_type: RecordTypeId, mut request: UpsertTableRequest) -> String {
        let uuid = match request.value_of(UUID_COLUMN) {
            Some(Value::Text(existing)) => existing.clone(),
            _ => {
                let generated = Uuid::new_v4().to_string();
                request.set_value(UUID_COLUMN, generated.clone());
                generated
            }
        };
        self.change_logs.add(record_type, uuid.clone(), self.owner);
        self.uuids.push(uuid.clone());
        self.requests.push(request);
        uuid
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn upsert_requests(&self) -> &[UpsertTableRequest] {
        &self.requests
    }

    /// Record uuids in the order they were added.
    pub fn uuids_in_order(&self) -> &[String] {
        &self.uuids
    }

    pub fn change_log_upsert_requests(&self) -> Vec<UpsertTableRequest> {
        self.change_logs.upsert_requests()
    }

    pub(crate) fn into_uuids(self) -> Vec<String> {
        self.uuids
    }
}
