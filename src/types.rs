//! Core types used throughout the row store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node identifier in the cluster.
///
/// Stable across restarts; assigned by the host process.
pub type NodeId = String;

/// Liveness of a peer as reported by the gossip collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    /// The node is healthy and responsive.
    Alive,
    /// The node has missed its heartbeat window; it may recover or be
    /// confirmed dead.
    Suspect,
    /// The node is confirmed failed and owns no ring tokens.
    Dead,
}

/// A physical member of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalNode {
    /// Unique node identifier.
    pub id: NodeId,

    /// Host the node's sync server listens on.
    pub host: String,

    /// Port the node's sync server listens on.
    pub port: u16,

    /// Current liveness state.
    pub status: NodeStatus,

    /// When this record was last touched by a membership event.
    pub last_updated: DateTime<Utc>,
}

impl PhysicalNode {
    /// Create a new Alive node.
    pub fn new(id: impl Into<NodeId>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            status: NodeStatus::Alive,
            last_updated: Utc::now(),
        }
    }

    /// Dialable address of the node's sync server.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the node is currently considered alive.
    pub fn is_alive(&self) -> bool {
        self.status == NodeStatus::Alive
    }
}

/// Identity of a row for deduplication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub page_id: String,
    pub component_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A stored row.
///
/// `hash_key` is the 64-bit placement token computed by the application
/// from its partitioning expression; it is serialized as a decimal string
/// in row files and on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub page_id: String,
    pub component_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(with = "u64_string")]
    pub hash_key: u64,
}

impl Row {
    /// The row's deduplication identity.
    pub fn key(&self) -> RowKey {
        RowKey {
            page_id: self.page_id.clone(),
            component_id: self.component_id.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Last-writer-wins: whether `other` supersedes this row.
    pub fn superseded_by(&self, other: &Row) -> bool {
        other.updated_at > self.updated_at
    }
}

/// Serde helper: u64 as a decimal string.
///
/// Row files and the sync wire format carry `hash_key` as a string so the
/// full u64 range survives JSON consumers that truncate large integers.
pub mod u64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
