//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open the writable and the read-only handle of one store file.
//! - Configure connection pragmas required by core behavior.
//! - Trigger core migrations before the writable handle is handed out.
//!
//! # Invariants
//! - Returned handles have `foreign_keys=ON` and a busy timeout.
//! - The writable handle runs in WAL mode so readers see committed snapshots.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens (creating if needed) the writable handle and applies migrations.
///
/// # Side effects
/// - Switches the store file to WAL journaling.
/// - Emits `db_open` logging events with duration and status.
pub fn open_writable(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=writable");

    let mut conn = match Connection::open(path) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=writable duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_writable(&mut conn, busy_timeout) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode=writable duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=writable duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens a read-only handle on an already bootstrapped store file.
pub fn open_readable(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=readable");

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let opened = Connection::open_with_flags(path, flags)
        .map_err(Into::into)
        .and_then(|conn| configure(&conn, busy_timeout).map(|()| conn));

    match opened {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok mode=readable duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode=readable duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_writable(conn: &mut Connection, busy_timeout: Duration) -> DbResult<()> {
    configure(conn, busy_timeout)?;
    // journal_mode reports the resulting mode as a row.
    conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    apply_migrations(conn)?;
    Ok(())
}

fn configure(conn: &Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
