//! Local row storage.
//!
//! The redistribution engine only depends on the `RowStore` contract;
//! `RowFileStore` is the JSON row-file implementation, `MemoryRowStore`
//! the ephemeral one used in tests and wiring demos.

mod memory;
mod rowfile;

pub use memory::MemoryRowStore;
pub use rowfile::RowFileStore;

use crate::error::Result;
use crate::ring::TokenRange;
use crate::types::Row;

/// Contract the redistribution engine consumes.
///
/// `insert` is an idempotent LWW upsert keyed by the row identity; callers
/// may retry or replay freely. `scan_by_range` tolerates concurrent
/// inserts (duplicates are harmless for the same reason).
#[async_trait::async_trait]
pub trait RowStore: Send + Sync + 'static {
    /// Upsert by row identity; rows with an older `updated_at` are
    /// ignored.
    async fn insert(&self, row: Row) -> Result<()>;

    /// All locally stored rows whose hash key falls in `range`. Order is
    /// unspecified.
    async fn scan_by_range(&self, range: TokenRange) -> Result<Vec<Row>>;

    /// Remove rows whose hash key falls in `range`, returning how many
    /// were removed.
    async fn delete_by_range(&self, range: TokenRange) -> Result<usize>;
}
