//! Eventually consistent replicated row store.
//!
//! Nodes form a peer ring; each row is placed on a replication-factor-sized
//! set of nodes chosen by a consistent-hash ring over virtual tokens. When
//! membership changes, the redistribution coordinator streams the rows of
//! every moved token range to its new owners in bounded batches; inbound
//! streams apply idempotently with last-writer-wins merging.
//!
//! # Architecture
//!
//! ```text
//!  gossip collaborator
//!        │  MembershipEvent
//!        ▼
//! ┌──────────────────┐  old/new ranges  ┌───────────────────────────┐
//! │ MembershipObserver│ ───────────────▶│ RedistributionCoordinator │
//! └──────────────────┘                  └───────────────────────────┘
//!        │ mutates                            │ scan        │ insert
//!        ▼                                    ▼             ▼
//! ┌──────────────────┐                  ┌──────────┐  ┌────────────┐
//! │    SharedRing    │                  │ RowStore │  │ SyncServer │
//! └──────────────────┘                  └──────────┘  └────────────┘
//!                                             ▲             │
//!                                             └── SyncData ─┘
//!                                                over TCP to peers
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use bonito::{
//!     HandoffConfig, MembershipEvent, MembershipObserver, PhysicalNode,
//!     RedistributionCoordinator, RingConfig, RowFileStore, SharedRing, SyncServer,
//!     TcpSyncTransport,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let local = PhysicalNode::new("node_0", "127.0.0.1", 9000);
//!
//!     let ring = SharedRing::new(RingConfig::new(3, 2))?;
//!     ring.add_node(local.clone())?;
//!     let store = Arc::new(RowFileStore::open("./data", &local.id).await?);
//!     let coordinator = RedistributionCoordinator::new(
//!         local.id.clone(),
//!         ring.clone(),
//!         store,
//!         Arc::new(TcpSyncTransport::default()),
//!         HandoffConfig::from_env(),
//!     );
//!
//!     let server = SyncServer::new("127.0.0.1:9000".parse()?, coordinator.clone());
//!     tokio::spawn(server.run());
//!
//!     // The gossip collaborator feeds membership events; each one that
//!     // moves tokens triggers redistribution in the background.
//!     let observer = MembershipObserver::new(ring, coordinator);
//!     observer.observe(MembershipEvent::NodeJoined(PhysicalNode::new(
//!         "node_1",
//!         "127.0.0.1",
//!         9001,
//!     )))?;
//!
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod network;
pub mod redistribution;
pub mod ring;
pub mod store;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use cluster::{LoggingListener, MembershipEvent, MembershipListener, MembershipObserver};
pub use config::{HandoffConfig, RingConfig, DEFAULT_MAX_BATCH_SIZE, MAX_BATCH_SIZE_ENV};
pub use error::{Error, Result, RingError, StoreError, TransportError};
pub use network::{
    RowRecord, StreamHandler, SyncDataRequest, SyncDataResponse, SyncServer, SyncStatus,
    SyncStream, SyncTransport, TcpSyncTransport,
};
pub use redistribution::{HandoffState, RedistributionCoordinator, SyncMetricsSnapshot};
pub use ring::{token_for_key, RingView, SharedRing, Token, TokenRange};
pub use store::{MemoryRowStore, RowFileStore, RowStore};
pub use types::{NodeId, NodeStatus, PhysicalNode, Row, RowKey};
