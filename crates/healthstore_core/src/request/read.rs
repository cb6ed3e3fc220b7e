//! Read descriptors and the per-table record decoder contract.

use super::command::{validate_identifier, SqlCommand};
use crate::error::{StoreError, StoreResult};
use crate::model::ROW_ID_COLUMN;
use rusqlite::{Row, Rows};
use std::borrow::Cow;

/// Turns store rows of one table into domain records.
///
/// Implementations own the column mapping; the manager only controls how far
/// the cursor advances.
pub trait RecordDecoder {
    type Record;

    fn decode_row(&self, row: &Row<'_>) -> StoreResult<Self::Record>;

    /// Decodes at most `limit` rows, leaving the cursor on the last one read.
    fn decode_page(&self, rows: &mut Rows<'_>, limit: usize) -> StoreResult<Vec<Self::Record>> {
        let mut records = Vec::new();
        while records.len() < limit {
            let Some(row) = rows.next()? else {
                break;
            };
            records.push(self.decode_row(row)?);
        }
        Ok(records)
    }
}

impl<R, F> RecordDecoder for F
where
    F: Fn(&Row<'_>) -> StoreResult<R>,
{
    type Record = R;

    fn decode_row(&self, row: &Row<'_>) -> StoreResult<R> {
        self(row)
    }
}

/// Read descriptor for a single table.
pub struct ReadTableRequest<R> {
    table: String,
    command: SqlCommand,
    page_size: Option<usize>,
    order_by_row_id: bool,
    decoder: Box<dyn RecordDecoder<Record = R>>,
}

impl<R> ReadTableRequest<R> {
    pub fn new(
        table: impl Into<String>,
        command: SqlCommand,
        decoder: impl RecordDecoder<Record = R> + 'static,
    ) -> Self {
        Self {
            table: table.into(),
            command,
            page_size: None,
            order_by_row_id: false,
            decoder: Box::new(decoder),
        }
    }

    /// Caps the rows decoded per read. Must be >= 1; zero is rejected when
    /// the request runs.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Orders the command's result by ascending `row_id`.
    pub fn ordered_by_row_id(mut self) -> Self {
        self.order_by_row_id = true;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn requested_page_size(&self) -> Option<usize> {
        self.page_size
    }

    pub fn decoder(&self) -> &dyn RecordDecoder<Record = R> {
        self.decoder.as_ref()
    }

    /// Command the manager executes; wrapped when row-id ordering is requested.
    pub(crate) fn effective_command(&self) -> StoreResult<Cow<'_, SqlCommand>> {
        validate_identifier("table", &self.table)?;
        if self.page_size == Some(0) {
            return Err(StoreError::InvalidArgument(format!(
                "page_size for `{}` must be >= 1",
                self.table
            )));
        }
        if !self.order_by_row_id {
            return Ok(Cow::Borrowed(&self.command));
        }
        Ok(Cow::Owned(SqlCommand::with_params(
            format!(
                "SELECT * FROM ({}) ORDER BY {ROW_ID_COLUMN} ASC",
                self.command.sql().trim_end().trim_end_matches(';')
            ),
            self.command.params().to_vec(),
        )))
    }
}

/// Read request spanning one or more tables decoded into one record type.
pub struct ReadTransactionRequest<R> {
    requests: Vec<ReadTableRequest<R>>,
}

impl<R> ReadTransactionRequest<R> {
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
        }
    }

    pub fn single(request: ReadTableRequest<R>) -> Self {
        Self {
            requests: vec![request],
        }
    }

    pub fn add(mut self, request: ReadTableRequest<R>) -> Self {
        self.requests.push(request);
        self
    }

    pub fn read_requests(&self) -> &[ReadTableRequest<R>] {
        &self.requests
    }
}

impl<R> Default for ReadTransactionRequest<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{ReadTableRequest, RecordDecoder};
    use crate::error::StoreResult;
    use crate::request::SqlCommand;
    use rusqlite::{Connection, Row};

    fn decode_value(row: &Row<'_>) -> StoreResult<i64> {
        Ok(row.get(0)?)
    }

    #[test]
    fn decode_page_stops_at_limit_and_leaves_cursor_positioned() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (2), (3);",
        )
        .unwrap();
        let mut stmt = conn.prepare("SELECT v FROM t ORDER BY v").unwrap();
        let mut rows = stmt.query([]).unwrap();

        let page = decode_value.decode_page(&mut rows, 2).unwrap();
        assert_eq!(page, vec![1, 2]);
        let next: i64 = rows.next().unwrap().unwrap().get(0).unwrap();
        assert_eq!(next, 3);
    }

    #[test]
    fn row_id_ordering_wraps_the_command() {
        let request = ReadTableRequest::new(
            "steps_record_table",
            SqlCommand::new("SELECT * FROM steps_record_table WHERE count > ?;").bind(5_i64),
            decode_value,
        )
        .ordered_by_row_id();
        let command = request.effective_command().unwrap();
        assert_eq!(
            command.sql(),
            "SELECT * FROM (SELECT * FROM steps_record_table WHERE count > ?) ORDER BY row_id ASC"
        );
        assert_eq!(command.params().len(), 1);
    }

    #[test]
    fn zero_page_size_is_rejected_before_running() {
        let request = ReadTableRequest::new(
            "steps_record_table",
            SqlCommand::new("SELECT * FROM steps_record_table"),
            decode_value,
        )
        .page_size(0);
        let err = request.effective_command().unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }
}
