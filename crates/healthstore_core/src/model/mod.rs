//! Identifier and value types shared by requests, helpers and the manager.
//!
//! # Responsibility
//! - Name the column conventions every record table follows.
//! - Define pagination tokens and owner-facing data origins.
//!
//! # Invariants
//! - `row_id` is store-assigned, monotonically increasing and never reused.
//! - A record's `uuid` is its stable external identity across updates.

mod ids;
mod page;

pub use ids::{
    DataOrigin, OwnerId, RecordTypeId, RowId, OWNER_COLUMN, ROW_ID_COLUMN, UUID_COLUMN,
};
pub use page::PageToken;

pub(crate) use ids::{now_epoch_ms, retention_cutoff_ms};
