//! In-memory column store.
//!
//! Mirrors the conflict rules of the production backend: last-writer-wins by
//! write timestamp, per-column TTL expiry, and row tombstones that shadow
//! older writes. Backs the test suites and HSS-less deployments where the
//! node is the master copy of its own data.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{Column, ColumnStore};

#[derive(Debug, Clone)]
struct Cell {
    value: String,
    timestamp: i64,
    expires_at: Option<Instant>,
}

impl Cell {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }

    fn ttl_remaining(&self, now: Instant) -> Option<u32> {
        self.expires_at
            .map(|deadline| deadline.saturating_duration_since(now).as_secs() as u32)
    }
}

#[derive(Default)]
struct Row {
    cells: HashMap<String, Cell>,
    /// Timestamp of the newest whole-row delete
    tombstone: i64,
}

#[derive(Default)]
struct Families {
    rows: HashMap<(String, String), Row>,
}

/// In-memory [`ColumnStore`] implementation
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Families>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ColumnStore for MemoryStore {
    async fn get_row(&self, family: &str, key: &str) -> StoreResult<Vec<Column>> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        let row = inner
            .rows
            .get(&(family.to_string(), key.to_string()))
            .ok_or(StoreError::NotFound)?;

        let mut columns: Vec<Column> = row
            .cells
            .iter()
            .filter(|(_, cell)| cell.live(now))
            .map(|(name, cell)| Column {
                name: name.clone(),
                value: cell.value.clone(),
                ttl: cell.ttl_remaining(now),
            })
            .collect();
        if columns.is_empty() {
            return Err(StoreError::NotFound);
        }
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(columns)
    }

    async fn put_columns(
        &self,
        family: &str,
        keys: &[String],
        columns: &[(String, String)],
        timestamp: i64,
        ttl: Option<u32>,
    ) -> StoreResult<()> {
        let expires_at = ttl
            .filter(|&secs| secs > 0)
            .map(|secs| Instant::now() + std::time::Duration::from_secs(secs as u64));

        let mut inner = self.inner.write().await;
        for key in keys {
            let row = inner
                .rows
                .entry((family.to_string(), key.to_string()))
                .or_default();
            if timestamp <= row.tombstone {
                continue;
            }
            for (name, value) in columns {
                let stale = row
                    .cells
                    .get(name)
                    .is_some_and(|cell| cell.timestamp > timestamp);
                if !stale {
                    row.cells.insert(
                        name.clone(),
                        Cell {
                            value: value.clone(),
                            timestamp,
                            expires_at,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn delete_rows(
        &self,
        family: &str,
        keys: &[String],
        timestamp: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for key in keys {
            if let Some(row) = inner.rows.get_mut(&(family.to_string(), key.to_string())) {
                row.cells.retain(|_, cell| cell.timestamp > timestamp);
                row.tombstone = row.tombstone.max(timestamp);
            }
        }
        Ok(())
    }

    async fn delete_columns(
        &self,
        family: &str,
        key: &str,
        names: &[String],
        timestamp: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(row) = inner.rows.get_mut(&(family.to_string(), key.to_string())) {
            for name in names {
                if row
                    .cells
                    .get(name)
                    .is_some_and(|cell| cell.timestamp <= timestamp)
                {
                    row.cells.remove(name);
                }
            }
        }
        Ok(())
    }
}
