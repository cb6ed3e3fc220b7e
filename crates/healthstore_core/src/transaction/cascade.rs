//! Manual child removal for stores whose schema does not cascade.
//!
//! # Invariants
//! - Children are removed depth-first in ascending `row_id` order; the parent
//!   row is always removed after all of its descendants.
//! - Runs on the caller's open transaction; never commits on its own.

use super::execute;
use crate::error::{StoreError, StoreResult};
use crate::helper::RecordTableRegistry;
use crate::model::{RowId, ROW_ID_COLUMN};
use crate::request::{validate_identifier, SqlCommand};
use rusqlite::Connection;

/// Deepest parent→child chain followed before the registry is assumed cyclic.
const MAX_CASCADE_DEPTH: usize = 16;

/// Deletes every registered descendant of `parent_table[parent_row_id]`.
///
/// Returns the number of descendant rows removed.
pub(crate) fn delete_descendants(
    conn: &Connection,
    tables: &RecordTableRegistry,
    parent_table: &str,
    parent_row_id: RowId,
) -> StoreResult<usize> {
    delete_descendants_at(conn, tables, parent_table, parent_row_id, 0)
}

fn delete_descendants_at(
    conn: &Connection,
    tables: &RecordTableRegistry,
    parent_table: &str,
    parent_row_id: RowId,
    depth: usize,
) -> StoreResult<usize> {
    if depth >= MAX_CASCADE_DEPTH {
        return Err(StoreError::InvalidArgument(format!(
            "child links below `{parent_table}` exceed depth {MAX_CASCADE_DEPTH}"
        )));
    }

    let mut removed = 0;
    for link in tables.children_of(parent_table) {
        validate_identifier("table", &link.child_table)?;
        validate_identifier("column", &link.parent_key_column)?;

        let child_row_ids = select_row_ids(
            conn,
            &SqlCommand::new(format!(
                "SELECT {ROW_ID_COLUMN} FROM {} WHERE {} = ? ORDER BY {ROW_ID_COLUMN}",
                link.child_table, link.parent_key_column
            ))
            .bind(parent_row_id),
        )?;

        for child_row_id in child_row_ids {
            removed +=
                delete_descendants_at(conn, tables, &link.child_table, child_row_id, depth + 1)?;
            removed += execute(
                conn,
                &SqlCommand::new(format!(
                    "DELETE FROM {} WHERE {ROW_ID_COLUMN} = ?",
                    link.child_table
                ))
                .bind(child_row_id),
            )?;
        }
    }
    Ok(removed)
}

pub(crate) fn select_row_ids(conn: &Connection, command: &SqlCommand) -> StoreResult<Vec<RowId>> {
    let mut stmt = conn.prepare(command.sql())?;
    let row_ids = stmt
        .query_map(rusqlite::params_from_iter(command.params()), |row| {
            row.get::<_, RowId>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(row_ids)
}
