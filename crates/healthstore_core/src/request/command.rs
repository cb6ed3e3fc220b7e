//! Parameterized command text and identifier hygiene.
//!
//! # Invariants
//! - Untrusted input travels only as bound parameters, never as SQL text.
//! - Table/column identifiers are validated before they are spliced into
//!   generated statements.

use crate::error::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern must compile")
});

/// Opaque command text plus its positional bound parameters.
///
/// The manager passes both through unmodified.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCommand {
    sql: String,
    params: Vec<Value>,
}

impl SqlCommand {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Appends one positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Equality conjunction used to match the row an update targets.
///
/// Typically keyed on the record `uuid` plus the owner column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClauses {
    clauses: Vec<(String, Value)>,
}

impl WhereClauses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((column.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Renders `a = ? AND b = ?` and the matching parameters, in order.
    pub(crate) fn to_sql(&self) -> StoreResult<(String, Vec<Value>)> {
        let mut parts = Vec::with_capacity(self.clauses.len());
        let mut params = Vec::with_capacity(self.clauses.len());
        for (column, value) in &self.clauses {
            validate_identifier("column", column)?;
            parts.push(format!("{column} = ?"));
            params.push(value.clone());
        }
        Ok((parts.join(" AND "), params))
    }

    /// Human-readable natural key, used in `RecordNotFound` diagnostics.
    pub fn describe(&self) -> String {
        self.clauses
            .iter()
            .map(|(column, value)| format!("{column}={}", describe_value(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub(crate) fn validate_identifier(kind: &str, name: &str) -> StoreResult<()> {
    if IDENTIFIER_PATTERN.is_match(name) {
        return Ok(());
    }
    Err(StoreError::InvalidArgument(format!(
        "invalid {kind} identifier `{name}`"
    )))
}

pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(number) => number.to_string(),
        Value::Real(number) => number.to_string(),
        Value::Text(text) => format!("'{text}'"),
        Value::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}
