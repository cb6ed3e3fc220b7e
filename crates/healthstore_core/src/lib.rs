//! Transactional persistence core for composite health records.
//!
//! All writes and reads go through [`TransactionManager`], which groups
//! request descriptors into atomic units on one embedded SQLite store.

pub mod changelog;
pub mod config;
pub mod db;
pub mod error;
pub mod helper;
pub mod logging;
pub mod model;
pub mod request;
pub mod transaction;

pub use changelog::{
    ChangeLogEntry, ChangeLogTokenRequest, ChangeLogs, ChangeLogsHelper, ChangeOperation,
};
pub use config::{CascadeMode, StoreConfig, StoreContext, DEFAULT_PAGE_SIZE};
pub use db::{ConnectionProvider, DbError, DbResult};
pub use error::{StoreError, StoreResult};
pub use helper::{
    ChildTableLink, OwnerIdentityResolver, RecordTableHelper, RecordTableRegistry,
    StandardRecordTable,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{DataOrigin, OwnerId, PageToken, RecordTypeId, RowId};
pub use request::{
    AggregateResultSink, AggregateTableRequest, ChildUpsertRequest, ConflictPolicy,
    DeleteTableRequest, DeleteTransactionRequest, ReadTableRequest, ReadTransactionRequest,
    RecordDecoder, SqlCommand, UpsertTableRequest, UpsertTransactionRequest, WhereClauses,
};
pub use transaction::TransactionManager;

/// Minimal health-check API for host wiring.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
