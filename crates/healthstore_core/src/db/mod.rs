//! Two-handle SQLite store backing the transaction manager.
//!
//! The writable handle is the only one that mutates. Opening it switches the
//! file to WAL, turns on foreign keys (the store-side cascade depends on it)
//! and migrates the change-log bookkeeping tables. The read-only handle is
//! opened afterwards against the same file and serves snapshot reads while a
//! write unit holds the writable handle.
//!
//! `user_version` tracks the bookkeeping schema. A file stamped newer than
//! this build understands is refused with
//! [`DbError::UnsupportedSchemaVersion`] instead of being downgraded.
//!
//! [`DbError`] only covers bootstrap; callers see it wrapped in
//! `StoreError::Unavailable`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod connection;
pub mod migrations;
mod open;

pub use connection::ConnectionProvider;
pub use open::{open_readable, open_writable};

pub type DbResult<T> = Result<T, DbError>;

/// Failure opening a handle or migrating the change-log tables.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
