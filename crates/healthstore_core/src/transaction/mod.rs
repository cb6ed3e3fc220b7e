//! Transaction manager: the single entry point for store reads and writes.
//!
//! # Responsibility
//! - Group request descriptors of one call into one unit of work.
//! - Fix execution order: reads before deletes, parents before children,
//!   delete-then-reinsert for updates of records that own child rows.
//! - Sequence read, paginated-read and aggregation queries on one snapshot.
//!
//! # Invariants
//! - Every write operation commits everything or nothing; store errors
//!   propagate unchanged after rollback.
//! - Writes use the shared writable handle under `BEGIN IMMEDIATE`, so write
//!   units are serialized process-wide.
//! - Reads use the shared readable handle inside one read transaction.
//! - No operation retries internally.

mod cascade;

use crate::changelog::{ChangeLogTokenRequest, ChangeLogsHelper};
use crate::config::{CascadeMode, StoreConfig, StoreContext};
use crate::db::ConnectionProvider;
use crate::error::{StoreError, StoreResult};
use crate::helper::{OwnerIdentityResolver, RecordTableHelper, RecordTableRegistry};
use crate::model::{now_epoch_ms, DataOrigin, OwnerId, PageToken, RowId, ROW_ID_COLUMN};
use crate::request::{
    describe_value, validate_identifier, AggregateResultSink, AggregateTableRequest,
    ConflictPolicy, DeleteTableRequest, DeleteTransactionRequest, ReadTransactionRequest,
    SqlCommand, UpsertTableRequest, UpsertTransactionRequest,
};
use log::{debug, info, trace, warn};
use once_cell::sync::OnceCell;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, TransactionBehavior};
use std::collections::HashSet;
use std::time::Instant;

static TRANSACTION_MANAGER: OnceCell<TransactionManager> = OnceCell::new();

pub struct TransactionManager {
    connections: ConnectionProvider,
    config: StoreConfig,
    tables: RecordTableRegistry,
}

impl TransactionManager {
    /// Builds a manager without registering it as the process instance.
    ///
    /// The store itself is opened lazily by the first operation.
    pub fn new(context: StoreContext) -> StoreResult<Self> {
        let StoreContext { config, tables } = context;
        config.validate()?;
        Ok(Self {
            connections: ConnectionProvider::new(&config.path, config.busy_timeout()),
            config,
            tables,
        })
    }

    /// Creates the process-wide manager on first call.
    ///
    /// Later calls return the existing instance and ignore `context`.
    pub fn initialize(context: StoreContext) -> StoreResult<&'static TransactionManager> {
        if let Some(manager) = TRANSACTION_MANAGER.get() {
            return Ok(manager);
        }
        TRANSACTION_MANAGER.get_or_try_init(|| {
            let manager = Self::new(context)?;
            info!(
                "event=txn_manager_init module=txn status=ok cascade={:?} tables={}",
                manager.config.cascade,
                manager.tables.helpers().len()
            );
            Ok(manager)
        })
    }

    /// Returns the process-wide manager.
    ///
    /// # Errors
    /// - `StoreError::NotInitialized` before [`TransactionManager::initialize`].
    pub fn instance() -> StoreResult<&'static TransactionManager> {
        TRANSACTION_MANAGER.get().ok_or(StoreError::NotInitialized)
    }

    /// Shared handles. Never close them; hold a guard only for one unit.
    pub fn connections(&self) -> &ConnectionProvider {
        &self.connections
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn record_tables(&self) -> &RecordTableRegistry {
        &self.tables
    }

    /// Inserts all requests (and their children) in one unit of work.
    ///
    /// Each top-level request keeps its own conflict policy. Returns the
    /// assigned row ids in input order.
    pub fn insert_all(&self, requests: &[UpsertTableRequest]) -> StoreResult<Vec<RowId>> {
        debug!(
            "event=insert_all module=txn status=start count={}",
            requests.len()
        );
        self.in_write_unit("insert_all", |conn| {
            requests
                .iter()
                .map(|request| insert_record(conn, request, request.conflict_policy(), None))
                .collect()
        })
    }

    /// Same as [`Self::insert_all`] with replace-on-conflict for top-level rows.
    pub fn insert_or_replace_all(
        &self,
        requests: &[UpsertTableRequest],
    ) -> StoreResult<Vec<RowId>> {
        self.in_write_unit("insert_or_replace_all", |conn| {
            requests
                .iter()
                .map(|request| insert_record(conn, request, ConflictPolicy::Replace, None))
                .collect()
        })
    }

    /// Inserts records plus their change-log entries in one unit of work.
    ///
    /// Returns record uuids in the order they were added to `request`.
    pub fn insert_records(&self, request: UpsertTransactionRequest) -> StoreResult<Vec<String>> {
        debug!(
            "event=insert_records module=txn status=start count={}",
            request.upsert_requests().len()
        );
        self.in_write_unit("insert_records", |conn| {
            for upsert in request.upsert_requests() {
                insert_record(conn, upsert, upsert.conflict_policy(), None)?;
            }
            for change_log in request.change_log_upsert_requests() {
                insert_record(conn, &change_log, ConflictPolicy::Abort, None)?;
            }
            Ok(())
        })?;
        Ok(request.into_uuids())
    }

    /// Inserts one record (with children) in its own unit of work.
    ///
    /// Meant for one record per call. Looping over this pays one transaction
    /// per record and loses cross-record atomicity; use [`Self::insert_all`].
    pub fn insert(&self, request: &UpsertTableRequest) -> StoreResult<RowId> {
        self.in_write_unit("insert", |conn| {
            insert_record(conn, request, request.conflict_policy(), None)
        })
    }

    /// Inserts one record, replacing a row that conflicts on a unique column.
    ///
    /// Conflicts on non-unique constraints still abort the unit; callers must
    /// only rely on this for unique columns.
    pub fn insert_or_replace(&self, request: &UpsertTableRequest) -> StoreResult<RowId> {
        self.in_write_unit("insert_or_replace", |conn| {
            insert_record(conn, request, ConflictPolicy::Replace, None)
        })
    }

    /// Updates all requests in one unit of work.
    ///
    /// Rows without children get a column update; rows with children are
    /// deleted (children follow by cascade) and fully reinserted.
    ///
    /// # Errors
    /// - `StoreError::RecordNotFound` when any request matches zero rows.
    pub fn update_all(&self, requests: &[UpsertTableRequest]) -> StoreResult<()> {
        self.in_write_unit("update_all", |conn| {
            requests
                .iter()
                .try_for_each(|request| self.update_record(conn, request))
        })
    }

    /// Updates records and writes their change-log entries in one unit.
    pub fn update_records(&self, request: UpsertTransactionRequest) -> StoreResult<()> {
        self.in_write_unit("update_records", |conn| {
            for upsert in request.upsert_requests() {
                self.update_record(conn, upsert)?;
            }
            for change_log in request.change_log_upsert_requests() {
                insert_record(conn, &change_log, ConflictPolicy::Abort, None)?;
            }
            Ok(())
        })
    }

    /// Deletes everything described by `request` in one unit of work.
    ///
    /// Pre-delete reads run first (capturing ids for the change log and
    /// enforcing owner checks), then every delete command, then the change
    /// log. Child rows are left to the configured cascade mode.
    ///
    /// # Errors
    /// - `StoreError::PermissionDenied` when an owner check fails; nothing is
    ///   deleted.
    /// - `StoreError::RecordNotFound` when an owner-checked read matches no
    ///   row; nothing is deleted.
    pub fn delete_all(&self, mut request: DeleteTransactionRequest) -> StoreResult<()> {
        let table_requests = request.take_table_requests();
        for table_request in &table_requests {
            table_request.validate()?;
        }

        self.in_write_unit("delete_all", |conn| {
            let mut captured = Vec::with_capacity(table_requests.len());
            for table_request in &table_requests {
                let row_ids = if table_request.requires_read() {
                    let fetched = read_before_delete(conn, table_request, &mut request)?;
                    if fetched.rows == 0 && table_request.requires_owner_check() {
                        return Err(owned_record_not_found(table_request));
                    }
                    fetched.row_ids
                } else {
                    None
                };
                captured.push(row_ids);
            }

            for (table_request, row_ids) in table_requests.iter().zip(captured) {
                self.execute_delete(conn, table_request, row_ids)?;
            }

            for change_log in request.change_log_upsert_requests() {
                insert_record(conn, &change_log, ConflictPolicy::Abort, None)?;
            }
            Ok(())
        })
    }

    /// Runs one delete command in its own unit of work.
    ///
    /// Returns the number of rows the delete command removed.
    ///
    /// # Errors
    /// - `StoreError::InvalidArgument` for owner-checked requests; those need
    ///   the caller's owner and go through [`Self::delete_all`].
    pub fn delete(&self, request: &DeleteTableRequest) -> StoreResult<usize> {
        request.validate()?;
        if request.requires_owner_check() {
            return Err(StoreError::InvalidArgument(format!(
                "owner-checked delete on `{}` requires a delete transaction request",
                request.table()
            )));
        }
        self.in_write_unit("delete", |conn| {
            let row_ids = self.capture_for_manual_cascade(conn, request)?;
            self.execute_delete(conn, request, row_ids)
        })
    }

    /// Deletes record rows older than `retention_days` across every
    /// registered record table, all in one unit of work.
    ///
    /// `0` means no retention policy is configured and does nothing.
    pub fn delete_stale_record_entries(&self, retention_days: u32) -> StoreResult<()> {
        if retention_days == 0 {
            debug!("event=retention_sweep module=txn status=skipped reason=no_policy");
            return Ok(());
        }

        let now_ms = now_epoch_ms();
        self.in_write_unit("delete_stale_record_entries", |conn| {
            let mut removed = 0;
            for helper in self.tables.helpers() {
                let request = helper.retention_delete_request(retention_days, now_ms);
                request.validate()?;
                let row_ids = self.capture_for_manual_cascade(conn, &request)?;
                removed += self.execute_delete(conn, &request, row_ids)?;
            }
            info!(
                "event=retention_sweep module=txn status=ok retention_days={retention_days} tables={} removed={removed}",
                self.tables.helpers().len()
            );
            Ok(())
        })
    }

    /// Prunes change logs and change-log request tokens together.
    pub fn delete_stale_change_log_entries(&self) -> StoreResult<()> {
        let now_ms = now_epoch_ms();
        self.in_write_unit("delete_stale_change_log_entries", |conn| {
            let tokens = execute(
                conn,
                ChangeLogTokenRequest::retention_delete_request(now_ms).delete_command(),
            )?;
            let change_logs = execute(
                conn,
                ChangeLogsHelper::retention_delete_request(now_ms).delete_command(),
            )?;
            info!(
                "event=change_log_sweep module=txn status=ok tokens_removed={tokens} change_logs_removed={change_logs}"
            );
            Ok(())
        })
    }

    /// Reads and decodes every table of `request`, concatenated in order.
    ///
    /// Each table decodes at most its own page size, or the configured
    /// default page size when it has none.
    pub fn read_records<R>(&self, request: &ReadTransactionRequest<R>) -> StoreResult<Vec<R>> {
        self.in_read_snapshot("read_records", |conn| {
            let mut records = Vec::new();
            for table_request in request.read_requests() {
                let command = table_request.effective_command()?;
                trace!(
                    "event=read module=txn table={} sql={}",
                    table_request.table(),
                    command.sql()
                );
                let limit = table_request
                    .requested_page_size()
                    .unwrap_or(self.config.default_page_size);
                let mut stmt = conn.prepare(command.sql())?;
                let mut rows = stmt.query(params_from_iter(command.params()))?;
                records.extend(table_request.decoder().decode_page(&mut rows, limit)?);
            }
            Ok(records)
        })
    }

    /// Reads one page from a single table and returns the next-page token.
    ///
    /// The token is the `row_id` of the first row past the page, or
    /// [`PageToken::End`] when the table has no further rows. The read
    /// command must project `row_id`.
    ///
    /// # Errors
    /// - `StoreError::InvalidArgument` unless `request` names exactly one table.
    pub fn read_records_and_get_next_token<R>(
        &self,
        request: &ReadTransactionRequest<R>,
    ) -> StoreResult<(Vec<R>, PageToken)> {
        let [table_request] = request.read_requests() else {
            return Err(StoreError::InvalidArgument(format!(
                "paginated read requires exactly one table, got {}",
                request.read_requests().len()
            )));
        };

        self.in_read_snapshot("read_records_and_get_next_token", |conn| {
            let command = table_request.effective_command()?;
            let limit = table_request
                .requested_page_size()
                .unwrap_or(self.config.default_page_size);
            let mut stmt = conn.prepare(command.sql())?;
            let mut rows = stmt.query(params_from_iter(command.params()))?;
            let records = table_request.decoder().decode_page(&mut rows, limit)?;
            let token = match rows.next()? {
                Some(row) => PageToken::Next(row.get::<_, RowId>(ROW_ID_COLUMN)?),
                None => PageToken::End,
            };
            Ok((records, token))
        })
    }

    /// Runs the aggregation and its metadata query on one snapshot and hands
    /// both result sets to the request's sink.
    pub fn populate_with_aggregation<S: AggregateResultSink>(
        &self,
        request: &mut AggregateTableRequest<S>,
    ) -> StoreResult<()> {
        self.in_read_snapshot("populate_with_aggregation", |conn| {
            let mut aggregation_stmt = conn.prepare(request.aggregation_command().sql())?;
            let mut metadata_stmt = conn.prepare(request.metadata_command().sql())?;
            let mut results =
                aggregation_stmt.query(params_from_iter(request.aggregation_command().params()))?;
            let mut metadata_rows =
                metadata_stmt.query(params_from_iter(request.metadata_command().params()))?;
            request.on_results_fetched(&mut results, &mut metadata_rows)
        })
    }

    /// Highest `row_id` currently in `table`; `None` when the table is empty.
    pub fn get_last_row_id_for(&self, table: &str) -> StoreResult<Option<RowId>> {
        validate_identifier("table", table)?;
        self.in_read_snapshot("get_last_row_id_for", |conn| {
            let row_id = conn.query_row(
                &format!("SELECT MAX({ROW_ID_COLUMN}) FROM {table}"),
                [],
                |row| row.get::<_, Option<RowId>>(0),
            )?;
            Ok(row_id)
        })
    }

    /// Distinct owners present in `helper`'s table, resolved to packages.
    ///
    /// Owners resolving to an empty name are skipped; order follows the
    /// distinct-owner query.
    pub fn get_distinct_package_names_for_record_table<O>(
        &self,
        helper: &dyn RecordTableHelper,
        resolver: &O,
    ) -> StoreResult<Vec<DataOrigin>>
    where
        O: OwnerIdentityResolver + ?Sized,
    {
        validate_identifier("table", helper.table_name())?;
        let command = helper.distinct_owner_read_command();
        let owners = self.in_read_snapshot("get_distinct_package_names", |conn| {
            let mut stmt = conn.prepare(command.sql())?;
            let owners = stmt
                .query_map(params_from_iter(command.params()), |row| {
                    row.get::<_, Option<OwnerId>>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(owners)
        })?;

        let mut seen = HashSet::new();
        Ok(owners
            .into_iter()
            .flatten()
            .map(|owner| resolver.package_name(owner))
            .filter(|package_name| !package_name.is_empty())
            .filter(|package_name| seen.insert(package_name.clone()))
            .map(DataOrigin::new)
            .collect())
    }

    fn update_record(&self, conn: &Connection, request: &UpsertTableRequest) -> StoreResult<()> {
        if !request.has_children() {
            let changed = execute(conn, &request.update_command()?)?;
            if changed == 0 {
                return Err(record_not_found(request));
            }
            return Ok(());
        }

        // Child rows cannot be reconciled in place: replace the whole record.
        let deleted = self.delete_matching(conn, request)?;
        if deleted == 0 {
            return Err(record_not_found(request));
        }
        insert_record(conn, request, request.conflict_policy(), None)?;
        Ok(())
    }

    fn delete_matching(&self, conn: &Connection, request: &UpsertTableRequest) -> StoreResult<usize> {
        if self.cascades_manually(request.table()) {
            let row_ids = cascade::select_row_ids(conn, &request.select_matching_row_ids_command()?)?;
            for row_id in row_ids {
                cascade::delete_descendants(conn, &self.tables, request.table(), row_id)?;
            }
        }
        execute(conn, &request.delete_matching_command()?)
    }

    fn execute_delete(
        &self,
        conn: &Connection,
        request: &DeleteTableRequest,
        captured_row_ids: Option<Vec<RowId>>,
    ) -> StoreResult<usize> {
        if self.cascades_manually(request.table()) {
            let row_ids = captured_row_ids.ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "manual cascade from `{}` requires a read command projecting {ROW_ID_COLUMN}",
                    request.table()
                ))
            })?;
            for row_id in row_ids {
                cascade::delete_descendants(conn, &self.tables, request.table(), row_id)?;
            }
        }
        execute(conn, request.delete_command())
    }

    fn capture_for_manual_cascade(
        &self,
        conn: &Connection,
        request: &DeleteTableRequest,
    ) -> StoreResult<Option<Vec<RowId>>> {
        if !self.cascades_manually(request.table()) {
            return Ok(None);
        }
        let Some(read) = request.read_command() else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(read.sql())?;
        let Ok(row_id_index) = stmt.column_index(ROW_ID_COLUMN) else {
            return Ok(None);
        };
        let row_ids = stmt
            .query_map(params_from_iter(read.params()), |row| {
                row.get::<_, RowId>(row_id_index)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(row_ids))
    }

    fn cascades_manually(&self, table: &str) -> bool {
        self.config.cascade == CascadeMode::Manual && self.tables.has_children(table)
    }

    fn in_write_unit<T>(
        &self,
        op: &'static str,
        work: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let started_at = Instant::now();
        let mut conn = self.connections.writable()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Dropping an uncommitted transaction rolls it back.
        let outcome = work(&tx).and_then(|value| tx.commit().map(|()| value).map_err(Into::into));
        match outcome {
            Ok(value) => {
                info!(
                    "event=tx_commit module=txn status=ok op={op} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(err) => {
                warn!(
                    "event=tx_rollback module=txn status=error op={op} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    fn in_read_snapshot<T>(
        &self,
        op: &'static str,
        work: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let started_at = Instant::now();
        let mut conn = self.connections.readable()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = work(&tx)?;
        tx.commit()?;
        debug!(
            "event=read_snapshot module=txn status=ok op={op} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(value)
    }
}

/// Inserts `request` and then its children with the fresh row id.
fn insert_record(
    conn: &Connection,
    request: &UpsertTableRequest,
    conflict: ConflictPolicy,
    parent_key: Option<(&str, RowId)>,
) -> StoreResult<RowId> {
    execute(conn, &request.insert_command(conflict, parent_key)?)?;
    let row_id = conn.last_insert_rowid();
    for child in request.children() {
        insert_record(
            conn,
            child.request(),
            child.request().conflict_policy(),
            Some((child.parent_key_column(), row_id)),
        )?;
    }
    Ok(row_id)
}

/// Outcome of one pre-delete read.
struct FetchedRows {
    rows: usize,
    /// Present only when the read projects `row_id`.
    row_ids: Option<Vec<RowId>>,
}

/// Runs the pre-delete read of `table_request`, feeding the change log and
/// enforcing owner checks row by row.
fn read_before_delete(
    conn: &Connection,
    table_request: &DeleteTableRequest,
    request: &mut DeleteTransactionRequest,
) -> StoreResult<FetchedRows> {
    let (Some(read), Some(record_type)) = (table_request.read_command(), table_request.record_type())
    else {
        return Ok(FetchedRows {
            rows: 0,
            row_ids: None,
        });
    };

    let mut stmt = conn.prepare(read.sql())?;
    let id_index = stmt.column_index(table_request.id_column_name())?;
    let owner_index = table_request
        .owner_column_name()
        .map(|column| stmt.column_index(column))
        .transpose()?;
    let row_id_index = stmt.column_index(ROW_ID_COLUMN).ok();

    let mut row_ids = row_id_index.map(|_| Vec::new());
    let mut fetched = 0;
    let mut rows = stmt.query(params_from_iter(read.params()))?;
    while let Some(row) = rows.next()? {
        fetched += 1;
        let record_id = id_to_string(row.get::<_, Value>(id_index)?, table_request)?;
        let row_owner = owner_index
            .map(|index| row.get::<_, Option<OwnerId>>(index))
            .transpose()?
            .flatten();

        request.on_record_fetched(record_type, record_id.clone(), row_owner);
        if table_request.requires_owner_check() {
            request.enforce_owner_check(table_request.table(), &record_id, row_owner)?;
        }
        if let (Some(index), Some(ids)) = (row_id_index, row_ids.as_mut()) {
            ids.push(row.get::<_, RowId>(index)?);
        }
    }
    Ok(FetchedRows {
        rows: fetched,
        row_ids,
    })
}

fn id_to_string(value: Value, table_request: &DeleteTableRequest) -> StoreResult<String> {
    match value {
        Value::Text(text) => Ok(text),
        Value::Integer(number) => Ok(number.to_string()),
        other => Err(StoreError::InvalidData(format!(
            "unsupported id value {other:?} in {}.{}",
            table_request.table(),
            table_request.id_column_name()
        ))),
    }
}

/// Owner-checked deletes must match their natural key; the key is rendered
/// from the pre-delete read's bound values.
fn owned_record_not_found(table_request: &DeleteTableRequest) -> StoreError {
    let key = table_request
        .read_command()
        .map(|read| {
            read.params()
                .iter()
                .map(describe_value)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    StoreError::RecordNotFound {
        table: table_request.table().to_string(),
        key: format!("{}=[{key}]", table_request.id_column_name()),
    }
}

fn record_not_found(request: &UpsertTableRequest) -> StoreError {
    StoreError::RecordNotFound {
        table: request.table().to_string(),
        key: request.natural_key(),
    }
}

pub(crate) fn execute(conn: &Connection, command: &SqlCommand) -> StoreResult<usize> {
    trace!("event=execute module=txn sql={}", command.sql());
    Ok(conn.execute(command.sql(), params_from_iter(command.params()))?)
}
