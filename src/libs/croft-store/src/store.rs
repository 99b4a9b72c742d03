//! The column-store access seam.
//!
//! The production backend is a wide-column store whose client library lives
//! outside this codebase; everything here goes through [`ColumnStore`] so a
//! backend can be plugged in without touching the typed cache layer.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::StoreResult;

/// One column of a row, with the TTL remaining on it (seconds), if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub value: String,
    pub ttl: Option<u32>,
}

impl Column {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ttl: None,
        }
    }
}

/// Asynchronous wide-column store operations.
///
/// Writes are idempotent for a given `(timestamp, ttl)` pair and resolve
/// conflicts last-writer-wins by timestamp. Timestamps are microseconds
/// supplied by the caller via [`generate_timestamp`].
#[async_trait]
pub trait ColumnStore: Send + Sync {
    /// Read all live columns of a row. `Err(NotFound)` when the row has no
    /// live columns.
    async fn get_row(&self, family: &str, key: &str) -> StoreResult<Vec<Column>>;

    /// Write the given columns into every listed row.
    async fn put_columns(
        &self,
        family: &str,
        keys: &[String],
        columns: &[(String, String)],
        timestamp: i64,
        ttl: Option<u32>,
    ) -> StoreResult<()>;

    /// Delete whole rows (all columns written at or before `timestamp`).
    async fn delete_rows(&self, family: &str, keys: &[String], timestamp: i64)
        -> StoreResult<()>;

    /// Delete the named columns from one row.
    async fn delete_columns(
        &self,
        family: &str,
        key: &str,
        names: &[String],
        timestamp: i64,
    ) -> StoreResult<()>;
}

/// Current time as microseconds since the epoch, suitable for write
/// timestamps
pub fn generate_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
