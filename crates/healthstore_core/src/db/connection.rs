//! Process-lifetime owner of the writable and readable store handles.
//!
//! # Responsibility
//! - Open each handle lazily on first use, exactly once.
//! - Serialize access to each handle behind its own mutex.
//!
//! # Invariants
//! - There is one writable and one readable handle per provider.
//! - The writable handle bootstraps the schema before any reader opens.
//! - Handles are closed only when the provider itself is dropped.

use super::{open_readable, open_writable};
use crate::error::{StoreError, StoreResult};
use log::warn;
use once_cell::sync::OnceCell;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub struct ConnectionProvider {
    path: PathBuf,
    busy_timeout: Duration,
    writable: OnceCell<Mutex<Connection>>,
    readable: OnceCell<Mutex<Connection>>,
}

impl ConnectionProvider {
    /// Creates a provider without touching the store yet.
    pub fn new(path: impl AsRef<Path>, busy_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout,
            writable: OnceCell::new(),
            readable: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the shared writable handle, opening the store on first use.
    ///
    /// Holding the guard excludes every other writer in the process.
    ///
    /// # Errors
    /// - `StoreError::Unavailable` when the store cannot be opened or migrated.
    pub fn writable(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        Ok(lock_handle(self.writable_handle()?, "writable"))
    }

    /// Returns the shared readable handle, opening it on first use.
    ///
    /// # Errors
    /// - `StoreError::Unavailable` when the store cannot be opened.
    pub fn readable(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        let handle = self.readable.get_or_try_init(|| {
            self.writable_handle()?;
            let conn = open_readable(&self.path, self.busy_timeout)?;
            Ok::<_, StoreError>(Mutex::new(conn))
        })?;
        Ok(lock_handle(handle, "readable"))
    }

    fn writable_handle(&self) -> StoreResult<&Mutex<Connection>> {
        let handle = self
            .writable
            .get_or_try_init(|| open_writable(&self.path, self.busy_timeout).map(Mutex::new))?;
        Ok(handle)
    }
}

// A unit of work that panicked was rolled back when its transaction dropped,
// so the connection behind a poisoned lock is still consistent.
fn lock_handle<'a>(handle: &'a Mutex<Connection>, mode: &str) -> MutexGuard<'a, Connection> {
    handle.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
        warn!("event=db_lock module=db status=recovered mode={mode} reason=poisoned");
        poisoned.into_inner()
    })
}
