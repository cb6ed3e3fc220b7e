use serde::{Deserialize, Serialize};

/// Store-assigned primary key; doubles as pagination cursor and foreign key.
pub type RowId = i64;

/// Internal owner (application) id stored in [`OWNER_COLUMN`].
pub type OwnerId = i64;

/// Tag identifying a record type in change-log entries.
pub type RecordTypeId = i32;

/// Primary key column of every record table.
pub const ROW_ID_COLUMN: &str = "row_id";

/// Owner column of every record table.
pub const OWNER_COLUMN: &str = "app_info_id";

/// Stable external identifier column of every record table.
pub const UUID_COLUMN: &str = "uuid";

/// External identity of a record owner, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataOrigin {
    pub package_name: String,
}

impl DataOrigin {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
        }
    }
}

/// Wall-clock time in Unix epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

/// Epoch-ms cutoff for "older than `days` days" relative to `now_ms`.
pub(crate) fn retention_cutoff_ms(now_ms: i64, days: u32) -> i64 {
    now_ms.saturating_sub(i64::from(days).saturating_mul(MILLIS_PER_DAY))
}

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
