//! Store configuration and construction context.
//!
//! # Invariants
//! - `default_page_size` is never zero.
//! - The cascade mode is explicit; the manager never guesses whether the
//!   schema declares `ON DELETE CASCADE`.

use crate::error::{StoreError, StoreResult};
use crate::helper::RecordTableRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Page size used when a read request does not carry one.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Who removes child rows when a parent row is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// The schema declares `ON DELETE CASCADE`; the store removes children.
    #[default]
    Store,
    /// The manager deletes registered child tables itself, parent last.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store file location.
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default)]
    pub cascade: CascadeMode,
}

impl StoreConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            default_page_size: DEFAULT_PAGE_SIZE,
            cascade: CascadeMode::default(),
        }
    }

    pub fn with_cascade(mut self, cascade: CascadeMode) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn with_default_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Rejects configurations the manager cannot honour.
    pub fn validate(&self) -> StoreResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::InvalidArgument(
                "store path cannot be empty".to_string(),
            ));
        }
        if self.default_page_size == 0 {
            return Err(StoreError::InvalidArgument(
                "default_page_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to construct a transaction manager once per process.
pub struct StoreContext {
    pub config: StoreConfig,
    pub tables: RecordTableRegistry,
}

impl StoreContext {
    pub fn new(config: StoreConfig, tables: RecordTableRegistry) -> Self {
        Self { config, tables }
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
