//! Error taxonomy shared by every transaction manager operation.
//!
//! # Invariants
//! - Store failures are carried verbatim; they are never translated into a
//!   semantic variant.
//! - Any error returned from a write operation means nothing was committed.

use crate::db::DbError;
use crate::model::OwnerId;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// The store could not be opened or bootstrapped.
    Unavailable(DbError),
    /// The store rejected a command (constraint, busy/locked, I/O).
    Execution(rusqlite::Error),
    /// An update matched zero rows for the given natural key.
    RecordNotFound { table: String, key: String },
    /// A read-before-delete found a row owned by somebody else.
    PermissionDenied {
        table: String,
        record_id: String,
        owner: Option<OwnerId>,
    },
    InvalidArgument(String),
    /// The process-wide manager was requested before initialization.
    NotInitialized,
    /// A decoder rejected persisted row data.
    InvalidData(String),
}

impl StoreError {
    /// Returns whether the store reported lock contention.
    ///
    /// The core never retries; callers may use this to decide whether to.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Execution(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Stable short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "store_unavailable",
            Self::Execution(_) => "store_execution",
            Self::RecordNotFound { .. } => "record_not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotInitialized => "not_initialized",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "store unavailable: {err}"),
            Self::Execution(err) => write!(f, "{err}"),
            Self::RecordNotFound { table, key } => {
                write!(f, "no record found in `{table}` for {key}")
            }
            Self::PermissionDenied {
                table,
                record_id,
                owner,
            } => match owner {
                Some(owner) => write!(
                    f,
                    "record `{record_id}` in `{table}` is not owned by app_info_id {owner}"
                ),
                None => write!(f, "record `{record_id}` in `{table}` has no owner"),
            },
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NotInitialized => write!(f, "transaction manager is not initialized"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
            Self::Execution(err) => Some(err),
            Self::RecordNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::InvalidArgument(_)
            | Self::NotInitialized
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Unavailable(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Execution(value)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreError;
    use rusqlite::ffi;

    fn sqlite_failure(code: i32) -> StoreError {
        StoreError::Execution(rusqlite::Error::SqliteFailure(
            ffi::Error::new(code),
            Some("simulated".to_string()),
        ))
    }

    #[test]
    fn busy_and_locked_failures_are_classified_as_busy() {
        assert!(sqlite_failure(ffi::SQLITE_BUSY).is_busy());
        assert!(sqlite_failure(ffi::SQLITE_LOCKED).is_busy());
        assert!(!sqlite_failure(ffi::SQLITE_CONSTRAINT).is_busy());
        assert!(!StoreError::NotInitialized.is_busy());
    }

    #[test]
    fn record_not_found_message_names_table_and_key() {
        let err = StoreError::RecordNotFound {
            table: "steps_record_table".to_string(),
            key: "uuid = 'abc'".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("steps_record_table"));
        assert!(message.contains("uuid = 'abc'"));
        assert_eq!(err.code(), "record_not_found");
    }
}
