//! Per-table collaborators the manager sequences but never second-guesses.
//!
//! # Responsibility
//! - Describe each known record table: its retention predicate and its
//!   distinct-owner query.
//! - Register parent/child table links for manual cascade.
//! - Resolve internal owner ids to external package names.
//!
//! # Invariants
//! - Helpers only produce commands; the manager decides grouping and order.
//! - Registered tables follow the `row_id`/`uuid`/`app_info_id` conventions.

use crate::model::{retention_cutoff_ms, OwnerId, RecordTypeId, OWNER_COLUMN, ROW_ID_COLUMN, UUID_COLUMN};
use crate::request::{DeleteTableRequest, SqlCommand};
use std::sync::Arc;

/// Table-specific knowledge needed by retention sweeps and owner reports.
pub trait RecordTableHelper: Send + Sync {
    fn table_name(&self) -> &str;

    fn record_type(&self) -> RecordTypeId;

    /// Delete request removing rows older than `retention_days` before `now_ms`.
    fn retention_delete_request(&self, retention_days: u32, now_ms: i64) -> DeleteTableRequest;

    /// Query projecting the distinct owner ids present in the table.
    fn distinct_owner_read_command(&self) -> SqlCommand {
        SqlCommand::new(format!(
            "SELECT DISTINCT {OWNER_COLUMN} FROM {}",
            self.table_name()
        ))
    }
}

/// Record table whose age is one epoch-ms time column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardRecordTable {
    table: String,
    record_type: RecordTypeId,
    time_column: String,
}

impl StandardRecordTable {
    pub fn new(
        table: impl Into<String>,
        record_type: RecordTypeId,
        time_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            record_type,
            time_column: time_column.into(),
        }
    }

    pub fn time_column(&self) -> &str {
        &self.time_column
    }
}

impl RecordTableHelper for StandardRecordTable {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn record_type(&self) -> RecordTypeId {
        self.record_type
    }

    fn retention_delete_request(&self, retention_days: u32, now_ms: i64) -> DeleteTableRequest {
        let cutoff = retention_cutoff_ms(now_ms, retention_days);
        DeleteTableRequest::new(
            self.table.clone(),
            SqlCommand::new(format!(
                "DELETE FROM {} WHERE {} < ?",
                self.table, self.time_column
            ))
            .bind(cutoff),
        )
        .with_read(
            self.record_type,
            SqlCommand::new(format!(
                "SELECT {ROW_ID_COLUMN}, {UUID_COLUMN} FROM {} WHERE {} < ?",
                self.table, self.time_column
            ))
            .bind(cutoff),
        )
    }
}

/// Foreign-key link from a child table to its parent's `row_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildTableLink {
    pub parent_table: String,
    pub child_table: String,
    pub parent_key_column: String,
}

impl ChildTableLink {
    pub fn new(
        parent_table: impl Into<String>,
        child_table: impl Into<String>,
        parent_key_column: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            child_table: child_table.into(),
            parent_key_column: parent_key_column.into(),
        }
    }
}

/// Known record tables and their child links.
#[derive(Clone, Default)]
pub struct RecordTableRegistry {
    helpers: Vec<Arc<dyn RecordTableHelper>>,
    child_links: Vec<ChildTableLink>,
}

impl RecordTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, helper: impl RecordTableHelper + 'static) -> Self {
        self.helpers.push(Arc::new(helper));
        self
    }

    pub fn with_child_link(mut self, link: ChildTableLink) -> Self {
        self.child_links.push(link);
        self
    }

    pub fn helpers(&self) -> &[Arc<dyn RecordTableHelper>] {
        &self.helpers
    }

    pub fn child_links(&self) -> &[ChildTableLink] {
        &self.child_links
    }

    pub fn children_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ChildTableLink> {
        self.child_links
            .iter()
            .filter(move |link| link.parent_table == table)
    }

    pub fn has_children(&self, table: &str) -> bool {
        self.children_of(table).next().is_some()
    }
}

/// Maps an internal owner id to its external package name.
///
/// Unknown owners resolve to an empty string and are skipped by reports.
pub trait OwnerIdentityResolver {
    fn package_name(&self, owner: OwnerId) -> String;
}

impl<F> OwnerIdentityResolver for F
where
    F: Fn(OwnerId) -> String,
{
    fn package_name(&self, owner: OwnerId) -> String {
        self(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChildTableLink, RecordTableHelper, RecordTableRegistry, StandardRecordTable};
    use rusqlite::types::Value;

    #[test]
    fn standard_table_retention_reads_and_deletes_with_one_cutoff() {
        let helper = StandardRecordTable::new("steps_record_table", 1, "start_time");
        let request = helper.retention_delete_request(2, 3 * 24 * 60 * 60 * 1000);

        let cutoff = Value::Integer(24 * 60 * 60 * 1000);
        assert_eq!(
            request.delete_command().sql(),
            "DELETE FROM steps_record_table WHERE start_time < ?"
        );
        assert_eq!(request.delete_command().params(), &[cutoff.clone()]);
        assert_eq!(request.read_command().map(|read| read.params().to_vec()), Some(vec![cutoff]));
        assert_eq!(request.record_type(), Some(1));
    }

    #[test]
    fn registry_lists_children_by_parent_table() {
        let registry = RecordTableRegistry::new()
            .with_table(StandardRecordTable::new("sleep_session_record_table", 2, "start_time"))
            .with_child_link(ChildTableLink::new(
                "sleep_session_record_table",
                "sleep_stages_table",
                "parent_key",
            ));

        assert_eq!(registry.helpers().len(), 1);
        assert!(registry.has_children("sleep_session_record_table"));
        assert!(!registry.has_children("sleep_stages_table"));
        assert_eq!(
            registry
                .children_of("sleep_session_record_table")
                .map(|link| link.child_table.as_str())
                .collect::<Vec<_>>(),
            vec!["sleep_stages_table"]
        );
    }
}
