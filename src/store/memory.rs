//! In-memory row store.

use crate::error::Result;
use crate::ring::TokenRange;
use crate::store::RowStore;
use crate::types::{Row, RowKey};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Ephemeral `RowStore` used by tests and wiring demos.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    rows: RwLock<HashMap<RowKey, Row>>,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Whether a row with this identity is present.
    pub fn contains(&self, key: &RowKey) -> bool {
        self.rows.read().contains_key(key)
    }
}

#[async_trait::async_trait]
impl RowStore for MemoryRowStore {
    async fn insert(&self, row: Row) -> Result<()> {
        let mut rows = self.rows.write();
        match rows.get(&row.key()) {
            Some(existing) if !existing.superseded_by(&row) => {}
            _ => {
                rows.insert(row.key(), row);
            }
        }
        Ok(())
    }

    async fn scan_by_range(&self, range: TokenRange) -> Result<Vec<Row>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| range.contains(row.hash_key))
            .cloned()
            .collect())
    }

    async fn delete_by_range(&self, range: TokenRange) -> Result<usize> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, row| !range.contains(row.hash_key));
        Ok(before - rows.len())
    }
}
