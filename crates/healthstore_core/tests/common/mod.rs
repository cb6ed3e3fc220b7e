#![allow(dead_code)]

use healthstore_core::{
    CascadeMode, ChildTableLink, OwnerId, ReadTableRequest, ReadTransactionRequest,
    RecordTableRegistry, RowId, SqlCommand, StandardRecordTable, StoreConfig, StoreContext,
    StoreResult, TransactionManager, UpsertTableRequest, WhereClauses,
};
use rusqlite::Row;
use tempfile::TempDir;

pub const STEPS_TABLE: &str = "steps_record_table";
pub const SLEEP_TABLE: &str = "sleep_session_record_table";
pub const STAGES_TABLE: &str = "sleep_stages_table";

pub const STEPS_TYPE: i32 = 1;
pub const SLEEP_TYPE: i32 = 2;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

const RECORD_SCHEMA: &str = "
CREATE TABLE steps_record_table (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    app_info_id INTEGER NOT NULL,
    start_time INTEGER NOT NULL,
    count INTEGER NOT NULL
);
CREATE TABLE sleep_session_record_table (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    app_info_id INTEGER NOT NULL,
    start_time INTEGER NOT NULL,
    title TEXT
);
";

const CASCADING_STAGES: &str = "
CREATE TABLE sleep_stages_table (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_key INTEGER NOT NULL
        REFERENCES sleep_session_record_table (row_id) ON DELETE CASCADE,
    stage INTEGER NOT NULL
);
";

// No ON DELETE clause: removing a parent before its stages violates the key.
const PLAIN_STAGES: &str = "
CREATE TABLE sleep_stages_table (
    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_key INTEGER NOT NULL
        REFERENCES sleep_session_record_table (row_id),
    stage INTEGER NOT NULL
);
";

pub struct TestStore {
    pub manager: TransactionManager,
    _dir: TempDir,
}

pub fn open_store(cascade: CascadeMode) -> TestStore {
    open_store_with(StoreConfig::new("unused").with_cascade(cascade))
}

/// Opens a fresh on-disk store; `config.path` is replaced by a temp file.
pub fn open_store_with(mut config: StoreConfig) -> TestStore {
    let dir = tempfile::tempdir().unwrap();
    config.path = dir.path().join("health.db");
    let stages = match config.cascade {
        CascadeMode::Store => CASCADING_STAGES,
        CascadeMode::Manual => PLAIN_STAGES,
    };

    let manager = TransactionManager::new(StoreContext::new(config, registry())).unwrap();
    manager
        .connections()
        .writable()
        .unwrap()
        .execute_batch(&format!("{RECORD_SCHEMA}{stages}"))
        .unwrap();

    TestStore {
        manager,
        _dir: dir,
    }
}

pub fn registry() -> RecordTableRegistry {
    RecordTableRegistry::new()
        .with_table(StandardRecordTable::new(STEPS_TABLE, STEPS_TYPE, "start_time"))
        .with_table(StandardRecordTable::new(SLEEP_TABLE, SLEEP_TYPE, "start_time"))
        .with_child_link(ChildTableLink::new(SLEEP_TABLE, STAGES_TABLE, "parent_key"))
}

pub fn steps(uuid: &str, owner: OwnerId, start_time: i64, count: i64) -> UpsertTableRequest {
    UpsertTableRequest::new(STEPS_TABLE)
        .value("uuid", uuid.to_string())
        .value("app_info_id", owner)
        .value("start_time", start_time)
        .value("count", count)
        .where_clauses(record_key(uuid, owner))
}

pub fn sleep_session(
    uuid: &str,
    owner: OwnerId,
    start_time: i64,
    title: &str,
    stages: &[i64],
) -> UpsertTableRequest {
    stages.iter().fold(
        UpsertTableRequest::new(SLEEP_TABLE)
            .value("uuid", uuid.to_string())
            .value("app_info_id", owner)
            .value("start_time", start_time)
            .value("title", title.to_string())
            .where_clauses(record_key(uuid, owner)),
        |request, stage| {
            request.child(
                "parent_key",
                UpsertTableRequest::new(STAGES_TABLE).value("stage", *stage),
            )
        },
    )
}

pub fn record_key(uuid: &str, owner: OwnerId) -> WhereClauses {
    WhereClauses::new()
        .equals("uuid", uuid.to_string())
        .equals("app_info_id", owner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepsRow {
    pub row_id: RowId,
    pub uuid: String,
    pub owner: OwnerId,
    pub count: i64,
}

pub fn decode_steps(row: &Row<'_>) -> StoreResult<StepsRow> {
    Ok(StepsRow {
        row_id: row.get("row_id")?,
        uuid: row.get("uuid")?,
        owner: row.get("app_info_id")?,
        count: row.get("count")?,
    })
}

pub fn all_steps() -> ReadTableRequest<StepsRow> {
    ReadTableRequest::new(
        STEPS_TABLE,
        SqlCommand::new("SELECT row_id, uuid, app_info_id, count FROM steps_record_table"),
        decode_steps,
    )
    .ordered_by_row_id()
}

pub fn read_steps(manager: &TransactionManager) -> Vec<StepsRow> {
    manager
        .read_records(&ReadTransactionRequest::single(all_steps()))
        .unwrap()
}

pub fn count_rows(manager: &TransactionManager, table: &str) -> i64 {
    manager
        .connections()
        .writable()
        .unwrap()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

pub fn row_id_of(manager: &TransactionManager, table: &str, uuid: &str) -> Option<RowId> {
    let conn = manager.connections().writable().unwrap();
    let mut stmt = conn
        .prepare(&format!("SELECT row_id FROM {table} WHERE uuid = ?"))
        .unwrap();
    let mut rows = stmt.query([uuid]).unwrap();
    let row_id = rows.next().unwrap().map(|row| row.get(0).unwrap());
    row_id
}

/// `(parent_key, stage)` pairs in row-id order.
pub fn stages(manager: &TransactionManager) -> Vec<(RowId, i64)> {
    let conn = manager.connections().writable().unwrap();
    let mut stmt = conn
        .prepare("SELECT parent_key, stage FROM sleep_stages_table ORDER BY row_id")
        .unwrap();
    let pairs = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    pairs
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
