//! Aggregation descriptor: two commands sequenced on one read snapshot.

use super::command::SqlCommand;
use crate::error::StoreResult;
use rusqlite::Rows;

/// Receives the aggregation rows together with their metadata rows.
///
/// Interpreting both result sets (bucket boundaries, group keys, ...) is the
/// sink's job; the manager only sequences the queries.
pub trait AggregateResultSink {
    fn on_results_fetched(
        &mut self,
        results: &mut Rows<'_>,
        metadata: &mut Rows<'_>,
    ) -> StoreResult<()>;
}

pub struct AggregateTableRequest<S> {
    aggregation: SqlCommand,
    metadata: SqlCommand,
    sink: S,
}

impl<S: AggregateResultSink> AggregateTableRequest<S> {
    pub fn new(aggregation: SqlCommand, metadata: SqlCommand, sink: S) -> Self {
        Self {
            aggregation,
            metadata,
            sink,
        }
    }

    pub fn aggregation_command(&self) -> &SqlCommand {
        &self.aggregation
    }

    pub fn metadata_command(&self) -> &SqlCommand {
        &self.metadata
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub(crate) fn on_results_fetched(
        &mut self,
        results: &mut Rows<'_>,
        metadata: &mut Rows<'_>,
    ) -> StoreResult<()> {
        self.sink.on_results_fetched(results, metadata)
    }
}
