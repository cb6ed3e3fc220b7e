//! Request descriptors consumed by the transaction manager.
//!
//! # Responsibility
//! - Describe one relational operation per table: upsert, read, delete or
//!   aggregate.
//! - Group table requests into the per-call transaction requests.
//!
//! # Invariants
//! - Descriptors are built per call, consumed once and never cached.
//! - Command text is opaque to the manager; values travel as bound params.

mod aggregate;
mod command;
mod delete;
mod read;
mod upsert;

pub use aggregate::{AggregateResultSink, AggregateTableRequest};
pub use command::{SqlCommand, WhereClauses};
pub use delete::{DeleteTableRequest, DeleteTransactionRequest};
pub use read::{ReadTableRequest, ReadTransactionRequest, RecordDecoder};
pub use upsert::{ChildUpsertRequest, ConflictPolicy, UpsertTableRequest, UpsertTransactionRequest};

pub(crate) use command::{describe_value, validate_identifier};
