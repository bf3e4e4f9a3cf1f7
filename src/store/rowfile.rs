//! JSON row-file store: one `<node_id>.json` array per node.
//!
//! The full row set is held in memory and rewritten through a temp file on
//! every mutation, so a concurrent reader of the file sees either the old
//! or the new array, never a torn one.

use crate::error::{Result, StoreError};
use crate::ring::TokenRange;
use crate::store::RowStore;
use crate::types::{Row, RowKey};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Persistent `RowStore` backed by a JSON array file.
#[derive(Debug)]
pub struct RowFileStore {
    path: PathBuf,
    rows: RwLock<HashMap<RowKey, Row>>,
}

impl RowFileStore {
    /// Open (or create) the row file for `node_id` under `dir`.
    pub async fn open(dir: impl AsRef<Path>, node_id: &str) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let path = dir.join(format!("{}.json", node_id));
        let rows = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Row> =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                list.into_iter().map(|row| (row.key(), row)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Io(e.to_string()).into()),
        };

        debug!(path = %path.display(), rows = rows.len(), "opened row file");
        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Whether a row with this identity is present.
    pub async fn contains(&self, key: &RowKey) -> bool {
        self.rows.read().await.contains_key(key)
    }

    /// Rewrite the row file through a temp file + rename.
    async fn persist(&self, rows: &HashMap<RowKey, Row>) -> Result<()> {
        let list: Vec<&Row> = rows.values().collect();
        let data = serde_json::to_vec(&list).map_err(|e| StoreError::Io(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RowStore for RowFileStore {
    async fn insert(&self, row: Row) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows.get(&row.key()) {
            // LWW: an equal-or-newer stored row makes this a no-op.
            Some(existing) if !existing.superseded_by(&row) => return Ok(()),
            _ => {
                rows.insert(row.key(), row);
            }
        }
        self.persist(&rows).await
    }

    async fn scan_by_range(&self, range: TokenRange) -> Result<Vec<Row>> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|row| range.contains(row.hash_key))
            .cloned()
            .collect())
    }

    async fn delete_by_range(&self, range: TokenRange) -> Result<usize> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| !range.contains(row.hash_key));
        let removed = before - rows.len();
        if removed > 0 {
            self.persist(&rows).await?;
        }
        Ok(removed)
    }
}
