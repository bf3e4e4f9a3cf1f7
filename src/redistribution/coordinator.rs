//! Redistribution coordinator.
//!
//! On every ring transition the coordinator diffs the old and new per-node
//! token ranges, spawns one handoff task per `(peer, moved range)` this
//! node holds data for, and applies inbound sync streams idempotently
//! through the row store.

use crate::config::HandoffConfig;
use crate::error::Error;
use crate::network::client::SyncTransport;
use crate::network::rpc::{BatchSource, SyncDataResponse};
use crate::network::server::StreamHandler;
use crate::redistribution::handoff::Handoff;
use crate::ring::{SharedRing, Token, TokenRange};
use crate::store::RowStore;
use crate::types::{NodeId, PhysicalNode, Row};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters for the sync paths.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub handoffs_started: AtomicU64,
    pub handoffs_completed: AtomicU64,
    pub handoffs_failed: AtomicU64,
    pub rows_sent: AtomicU64,
    pub rows_received: AtomicU64,
    pub rows_malformed: AtomicU64,
}

/// Point-in-time copy of `SyncMetrics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMetricsSnapshot {
    pub handoffs_started: u64,
    pub handoffs_completed: u64,
    pub handoffs_failed: u64,
    pub rows_sent: u64,
    pub rows_received: u64,
    pub rows_malformed: u64,
}

impl SyncMetrics {
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            handoffs_started: self.handoffs_started.load(Ordering::Relaxed),
            handoffs_completed: self.handoffs_completed.load(Ordering::Relaxed),
            handoffs_failed: self.handoffs_failed.load(Ordering::Relaxed),
            rows_sent: self.rows_sent.load(Ordering::Relaxed),
            rows_received: self.rows_received.load(Ordering::Relaxed),
            rows_malformed: self.rows_malformed.load(Ordering::Relaxed),
        }
    }
}

/// Streams moved ranges to their new owners and applies inbound streams.
pub struct RedistributionCoordinator {
    local_id: NodeId,
    ring: Arc<SharedRing>,
    store: Arc<dyn RowStore>,
    transport: Arc<dyn SyncTransport>,
    config: HandoffConfig,

    /// `(peer, range)` pairs currently being streamed, so the same handoff
    /// is never in flight twice. Critical sections are O(1).
    in_flight: Mutex<HashSet<(NodeId, TokenRange)>>,

    metrics: SyncMetrics,
    cancel: CancellationToken,

    /// Back-reference for spawning follow-up syncs from `&self` contexts
    /// (the inbound path runs behind a `dyn StreamHandler`).
    self_ref: Weak<Self>,
}

impl RedistributionCoordinator {
    pub fn new(
        local_id: impl Into<NodeId>,
        ring: Arc<SharedRing>,
        store: Arc<dyn RowStore>,
        transport: Arc<dyn SyncTransport>,
        config: HandoffConfig,
    ) -> Arc<Self> {
        let local_id = local_id.into();
        Arc::new_cyclic(|self_ref| Self {
            local_id,
            ring,
            store,
            transport,
            config,
            in_flight: Mutex::new(HashSet::new()),
            metrics: SyncMetrics::default(),
            cancel: CancellationToken::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// This node's id.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Token cancelling all in-flight handoffs on shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// React to a ring transition.
    ///
    /// For each peer, every range it stores now but did not store before
    /// is a candidate; it is handed off when this node previously held any
    /// of its tokens or remains a responsible replica. Candidates are
    /// grouped per range so the rows are scanned once and every gaining
    /// peer sees the same copy, and the range is only released after all
    /// of them have it.
    pub async fn on_ring_change(
        self: &Arc<Self>,
        old_ranges: HashMap<NodeId, Vec<TokenRange>>,
        new_ranges: HashMap<NodeId, Vec<TokenRange>>,
    ) {
        let empty = Vec::new();
        let local_old = old_ranges.get(&self.local_id).unwrap_or(&empty);
        let local_new = new_ranges.get(&self.local_id).unwrap_or(&empty);

        let mut targets: HashMap<TokenRange, Vec<NodeId>> = HashMap::new();
        for (peer_id, peer_new) in &new_ranges {
            if *peer_id == self.local_id {
                continue;
            }

            let peer_old: HashSet<&TokenRange> = old_ranges
                .get(peer_id)
                .map(|ranges| ranges.iter().collect())
                .unwrap_or_default();

            for range in peer_new {
                if peer_old.contains(range) {
                    continue;
                }
                let held_locally = local_old
                    .iter()
                    .chain(local_new.iter())
                    .any(|local| local.intersects(range));
                if !held_locally {
                    continue;
                }
                targets.entry(*range).or_default().push(peer_id.clone());
            }
        }

        if targets.is_empty() {
            return;
        }

        info!(
            node_id = %self.local_id,
            moved_ranges = targets.len(),
            "ring change triggered redistribution"
        );
        for (range, peers) in targets {
            self.spawn_range_sync(range, peers);
        }
    }

    /// Claim the `(peer, range)` slots and spawn the sync task for one
    /// moved range. Peers whose handoff is already in flight are dropped;
    /// they are retried on the next ring change.
    fn spawn_range_sync(self: &Arc<Self>, range: TokenRange, peers: Vec<NodeId>) {
        let claimed: Vec<NodeId> = {
            let mut in_flight = self.in_flight.lock();
            peers
                .into_iter()
                .filter(|peer| {
                    let fresh = in_flight.insert((peer.clone(), range));
                    if !fresh {
                        debug!(peer = %peer, range = %range, "handoff already in flight");
                    }
                    fresh
                })
                .collect()
        };

        if claimed.is_empty() {
            return;
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.sync_range(range, &claimed).await;
            let mut in_flight = this.in_flight.lock();
            for peer in &claimed {
                in_flight.remove(&(peer.clone(), range));
            }
        });
    }

    /// Stream one moved range to each gaining peer, then release it
    /// locally once every peer has the data and this node no longer
    /// replicates it.
    async fn sync_range(&self, range: TokenRange, peers: &[NodeId]) {
        let rows = match self.store.scan_by_range(range).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(range = %range, error = %e, "failed to scan rows for handoff");
                self.metrics.handoffs_failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if rows.is_empty() {
            debug!(range = %range, "no local rows in moved range");
            return;
        }

        let mut all_delivered = true;
        for peer_id in peers {
            let Some(peer) = self.ring.read().node(peer_id).cloned() else {
                warn!(peer = %peer_id, range = %range, "peer not in ring; dropping handoff");
                all_delivered = false;
                continue;
            };
            if !self.send_range_to(peer, range, rows.clone()).await {
                all_delivered = false;
            }
        }

        if all_delivered {
            self.maybe_release_range(range).await;
        }
    }

    /// One handoff: stream `rows` to `peer` under the per-stream deadline.
    async fn send_range_to(&self, peer: PhysicalNode, range: TokenRange, rows: Vec<Row>) -> bool {
        self.metrics.handoffs_started.fetch_add(1, Ordering::Relaxed);

        let mut handoff = Handoff::new(self.local_id.clone(), peer.clone(), range);
        let result = match tokio::time::timeout(
            self.config.stream_timeout,
            handoff.run(rows, self.transport.as_ref(), &self.config, &self.cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                handoff.fail();
                Err(Error::Timeout)
            }
        };

        match result {
            Ok(sent) => {
                self.metrics.handoffs_completed.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .rows_sent
                    .fetch_add(sent as u64, Ordering::Relaxed);
                info!(peer = %peer.id, range = %range, rows = sent, "handoff complete");
                true
            }
            Err(e) => {
                self.metrics.handoffs_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    peer = %peer.id,
                    range = %range,
                    error = %e,
                    "handoff failed; retried on next ring change"
                );
                false
            }
        }
    }

    /// Drop a handed-off range when the current ring no longer lists this
    /// node among its replicas.
    async fn maybe_release_range(&self, range: TokenRange) {
        let still_replica = self
            .ring
            .replicas_for(range.end)
            .iter()
            .any(|id| *id == self.local_id);
        if still_replica {
            return;
        }

        match self.store.delete_by_range(range).await {
            Ok(removed) if removed > 0 => {
                debug!(range = %range, removed, "released handed-off range")
            }
            Ok(_) => {}
            Err(e) => warn!(range = %range, error = %e, "failed to release handed-off range"),
        }
    }

    /// Apply one inbound sync stream.
    ///
    /// Malformed rows are skipped and counted; a store failure aborts the
    /// stream with an error status, keeping partial progress (inserts are
    /// idempotent, so the sender's retry converges).
    pub async fn handle_inbound_stream(&self, source: &mut dyn BatchSource) -> SyncDataResponse {
        let mut applied = 0u64;
        let mut tokens: Vec<Token> = Vec::new();

        loop {
            let batch = match source.next().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    warn!(node_id = %self.local_id, error = %e, "inbound sync stream aborted");
                    return SyncDataResponse::error(e.to_string());
                }
            };

            debug!(
                node_id = %self.local_id,
                sender = %batch.sender_id,
                rows = batch.rows.len(),
                "received sync batch"
            );

            let sender_id = batch.sender_id;
            for record in batch.rows {
                let row = match Row::try_from(record) {
                    Ok(row) => row,
                    Err(e) => {
                        self.metrics.rows_malformed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            node_id = %self.local_id,
                            sender = %sender_id,
                            error = %e,
                            "dropping malformed row"
                        );
                        continue;
                    }
                };

                let token = row.hash_key;
                if let Err(e) = self.store.insert(row).await {
                    error!(node_id = %self.local_id, error = %e, "failed to insert synced row");
                    return SyncDataResponse::error(e.to_string());
                }
                applied += 1;
                tokens.push(token);
                self.metrics.rows_received.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.reroute_misplaced(&tokens);
        SyncDataResponse::success(format!("synced {} rows", applied))
    }

    /// Forward inbound rows this node does not replicate under the current
    /// ring.
    ///
    /// A sender races ring mutations by design: its snapshot may already
    /// be stale when its rows arrive. The stream is accepted either way;
    /// forwarding the misplaced ranges to their current replicas (and then
    /// releasing them) is what restores the placement invariant at
    /// quiescence.
    fn reroute_misplaced(&self, tokens: &[Token]) {
        let Some(this) = self.self_ref.upgrade() else {
            return;
        };

        let snapshot = self.ring.snapshot();
        let mut seen: HashSet<TokenRange> = HashSet::new();
        let mut targets: HashMap<TokenRange, Vec<NodeId>> = HashMap::new();

        for &token in tokens {
            let Some(range) = snapshot.range_for(token) else {
                continue;
            };
            if !seen.insert(range) {
                continue;
            }
            let replicas = snapshot.replicas_for(range.end);
            if replicas.is_empty() || replicas.iter().any(|id| *id == self.local_id) {
                continue;
            }
            targets.insert(range, replicas);
        }

        if targets.is_empty() {
            return;
        }

        debug!(
            node_id = %self.local_id,
            ranges = targets.len(),
            "re-routing misplaced inbound rows"
        );
        for (range, peers) in targets {
            this.spawn_range_sync(range, peers);
        }
    }
}

#[async_trait::async_trait]
impl StreamHandler for RedistributionCoordinator {
    async fn handle_stream(&self, source: &mut dyn BatchSource) -> SyncDataResponse {
        self.handle_inbound_stream(source).await
    }
}

impl std::fmt::Debug for RedistributionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedistributionCoordinator")
            .field("local_id", &self.local_id)
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RingConfig;
    use crate::error::{Result, StoreError};
    use crate::network::client::SyncStream;
    use crate::network::rpc::{RowRecord, SyncDataRequest};
    use crate::store::MemoryRowStore;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::time::Duration;

    fn row(page_id: &str, hash_key: u64) -> Row {
        Row {
            page_id: page_id.to_string(),
            component_id: "btn1".to_string(),
            timestamp: Utc.timestamp_opt(1_733_557_279, 0).unwrap(),
            event: "click".to_string(),
            created_at: Utc.timestamp_opt(1_733_557_279, 0).unwrap(),
            updated_at: Utc.timestamp_opt(1_733_557_280, 0).unwrap(),
            hash_key,
        }
    }

    /// Transport that records every batch instead of dialing.
    #[derive(Default)]
    struct RecordingTransport {
        batches: Arc<Mutex<Vec<(String, SyncDataRequest)>>>,
    }

    struct RecordingStream {
        addr: String,
        batches: Arc<Mutex<Vec<(String, SyncDataRequest)>>>,
    }

    #[async_trait::async_trait]
    impl SyncTransport for RecordingTransport {
        async fn open(&self, addr: &str) -> Result<Box<dyn SyncStream>> {
            Ok(Box::new(RecordingStream {
                addr: addr.to_string(),
                batches: self.batches.clone(),
            }))
        }
    }

    #[async_trait::async_trait]
    impl SyncStream for RecordingStream {
        async fn send(&mut self, batch: &SyncDataRequest) -> Result<()> {
            self.batches.lock().push((self.addr.clone(), batch.clone()));
            Ok(())
        }

        async fn finish(self: Box<Self>) -> Result<SyncDataResponse> {
            Ok(SyncDataResponse::success("ok"))
        }
    }

    /// Store whose inserts always fail.
    struct FailingStore;

    #[async_trait::async_trait]
    impl RowStore for FailingStore {
        async fn insert(&self, _row: Row) -> Result<()> {
            Err(StoreError::Io("disk full".to_string()).into())
        }

        async fn scan_by_range(&self, _range: TokenRange) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn delete_by_range(&self, _range: TokenRange) -> Result<usize> {
            Ok(0)
        }
    }

    /// In-memory batch source for driving the inbound path directly.
    struct VecBatchSource {
        batches: VecDeque<SyncDataRequest>,
    }

    impl VecBatchSource {
        fn new(batches: Vec<SyncDataRequest>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    #[async_trait::async_trait]
    impl BatchSource for VecBatchSource {
        async fn next(&mut self) -> Result<Option<SyncDataRequest>> {
            Ok(self.batches.pop_front())
        }
    }

    fn coordinator_with(
        store: Arc<dyn RowStore>,
        transport: Arc<dyn SyncTransport>,
        ring_config: RingConfig,
        node_ids: &[&str],
        batch_size: usize,
    ) -> Arc<RedistributionCoordinator> {
        let ring = SharedRing::new(ring_config).unwrap();
        for id in node_ids {
            ring.add_node(PhysicalNode::new(*id, "127.0.0.1", 9100))
                .unwrap();
        }
        RedistributionCoordinator::new(
            "node_0",
            ring,
            store,
            transport,
            HandoffConfig::default().with_max_batch_size(batch_size),
        )
    }

    async fn wait_for_batches(
        recorded: &Arc<Mutex<Vec<(String, SyncDataRequest)>>>,
        min: usize,
    ) -> usize {
        for _ in 0..100 {
            if recorded.lock().len() >= min {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        recorded.lock().len()
    }

    #[tokio::test]
    async fn test_moved_ranges_stream_to_new_owner() {
        let store = Arc::new(MemoryRowStore::new());
        for i in 0..10u64 {
            store
                .insert(row(&format!("page_{}", i), i.wrapping_mul(0x9E3779B97F4A7C15)))
                .await
                .unwrap();
        }

        let transport = Arc::new(RecordingTransport::default());
        let recorded = transport.batches.clone();

        // Self-only ring, then node_1 joins.
        let coordinator =
            coordinator_with(store.clone(), transport, RingConfig::new(3, 2), &["node_0"], 100);
        let old = coordinator.ring.read().all_ranges();
        coordinator
            .ring
            .add_node(PhysicalNode::new("node_1", "127.0.0.1", 9101))
            .unwrap();
        let new = coordinator.ring.read().all_ranges();

        coordinator.on_ring_change(old, new).await;
        let batches = wait_for_batches(&recorded, 1).await;
        assert!(batches >= 1, "expected at least one batch, got {}", batches);

        // Every recorded batch names this node as the sender.
        for (_, batch) in recorded.lock().iter() {
            assert_eq!(batch.sender_id, "node_0");
        }

        let metrics = coordinator.metrics();
        assert!(metrics.handoffs_completed > 0);
        assert_eq!(metrics.handoffs_failed, 0);
    }

    #[tokio::test]
    async fn test_batches_respect_max_batch_size() {
        let store = Arc::new(MemoryRowStore::new());
        for i in 0..25u64 {
            store
                .insert(row(&format!("page_{}", i), i.wrapping_mul(0x9E3779B97F4A7C15)))
                .await
                .unwrap();
        }

        let transport = Arc::new(RecordingTransport::default());
        let recorded = transport.batches.clone();

        let coordinator = coordinator_with(store, transport, RingConfig::new(3, 2), &["node_0"], 4);
        let old = coordinator.ring.read().all_ranges();
        coordinator
            .ring
            .add_node(PhysicalNode::new("node_1", "127.0.0.1", 9101))
            .unwrap();
        let new = coordinator.ring.read().all_ranges();

        coordinator.on_ring_change(old, new).await;
        wait_for_batches(&recorded, 1).await;
        // Let all spawned handoffs drain.
        tokio::time::sleep(Duration::from_millis(100)).await;

        for (_, batch) in recorded.lock().iter() {
            assert!(batch.rows.len() <= 4, "batch of {} rows", batch.rows.len());
        }
    }

    #[tokio::test]
    async fn test_unmoved_ranges_are_not_sent() {
        let store = Arc::new(MemoryRowStore::new());
        store.insert(row("page", 42)).await.unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let recorded = transport.batches.clone();

        let coordinator = coordinator_with(store, transport, RingConfig::new(3, 2), &["node_0", "node_1"], 100);
        // Identical old and new: nothing moved.
        let ranges = coordinator.ring.read().all_ranges();
        coordinator.on_ring_change(ranges.clone(), ranges).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorded.lock().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_stream_applies_rows() {
        let store = Arc::new(MemoryRowStore::new());
        let coordinator = coordinator_with(
            store.clone(),
            Arc::new(RecordingTransport::default()),
            RingConfig::new(3, 2),
            &["node_0"],
            100,
        );

        let rows = vec![row("19", 100), row("86", 200)];
        let mut source = VecBatchSource::new(vec![SyncDataRequest::new("node_1", &rows)]);

        let response = coordinator.handle_inbound_stream(&mut source).await;
        assert!(response.is_success());
        assert_eq!(store.len(), 2);
        assert_eq!(coordinator.metrics().rows_received, 2);
    }

    #[tokio::test]
    async fn test_inbound_stream_is_idempotent() {
        let store = Arc::new(MemoryRowStore::new());
        let coordinator = coordinator_with(
            store.clone(),
            Arc::new(RecordingTransport::default()),
            RingConfig::new(3, 2),
            &["node_0"],
            100,
        );

        let rows = vec![row("19", 100), row("86", 200)];
        for _ in 0..2 {
            let mut source = VecBatchSource::new(vec![SyncDataRequest::new("node_1", &rows)]);
            let response = coordinator.handle_inbound_stream(&mut source).await;
            assert!(response.is_success());
        }

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_row_is_skipped_not_fatal() {
        let store = Arc::new(MemoryRowStore::new());
        let coordinator = coordinator_with(
            store.clone(),
            Arc::new(RecordingTransport::default()),
            RingConfig::new(3, 2),
            &["node_0"],
            100,
        );

        let mut batch = SyncDataRequest::new("node_1", &[row("19", 100), row("86", 200)]);
        let mut broken = RowRecord::from_row(&row("42", 300));
        broken.data.remove("hash_key");
        batch.rows.insert(1, broken);

        let mut source = VecBatchSource::new(vec![batch]);
        let response = coordinator.handle_inbound_stream(&mut source).await;

        assert!(response.is_success());
        assert_eq!(store.len(), 2);
        assert_eq!(coordinator.metrics().rows_malformed, 1);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_stream() {
        let coordinator = coordinator_with(
            Arc::new(FailingStore),
            Arc::new(RecordingTransport::default()),
            RingConfig::new(3, 2),
            &["node_0"],
            100,
        );

        let mut source =
            VecBatchSource::new(vec![SyncDataRequest::new("node_1", &[row("19", 100)])]);
        let response = coordinator.handle_inbound_stream(&mut source).await;

        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_misplaced_inbound_rows_are_rerouted() {
        // R = 1, two nodes: rows landing here that belong to the peer are
        // forwarded to it and then dropped locally.
        let store = Arc::new(MemoryRowStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let recorded = transport.batches.clone();

        let coordinator = coordinator_with(
            store.clone(),
            transport,
            RingConfig::new(8, 1),
            &["node_0", "node_1"],
            100,
        );

        // Find tokens owned solely by the peer.
        let snapshot = coordinator.ring.snapshot();
        let misplaced: Vec<Row> = (0..200u64)
            .map(|i| row(&format!("page_{}", i), i.wrapping_mul(0x9E3779B97F4A7C15)))
            .filter(|r| snapshot.replicas_for(r.hash_key) == vec!["node_1".to_string()])
            .take(5)
            .collect();
        assert!(!misplaced.is_empty());

        let mut source =
            VecBatchSource::new(vec![SyncDataRequest::new("node_9", &misplaced)]);
        let response = coordinator.handle_inbound_stream(&mut source).await;
        assert!(response.is_success());

        wait_for_batches(&recorded, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let forwarded: usize = recorded
            .lock()
            .iter()
            .map(|(_, batch)| batch.rows.len())
            .sum();
        assert!(forwarded >= misplaced.len());
        // Forwarded rows were released locally.
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_handed_off_ranges_are_released() {
        // R = 1: ranges gained by the new node stop being replicated here,
        // so they are deleted after a successful handoff.
        let store = Arc::new(MemoryRowStore::new());
        for i in 0..20u64 {
            store
                .insert(row(&format!("page_{}", i), i.wrapping_mul(0x9E3779B97F4A7C15)))
                .await
                .unwrap();
        }

        let transport = Arc::new(RecordingTransport::default());
        let recorded = transport.batches.clone();

        let coordinator = coordinator_with(
            store.clone(),
            transport,
            RingConfig::new(8, 1),
            &["node_0"],
            100,
        );
        let old = coordinator.ring.read().all_ranges();
        coordinator
            .ring
            .add_node(PhysicalNode::new("node_1", "127.0.0.1", 9101))
            .unwrap();
        let new = coordinator.ring.read().all_ranges();

        coordinator.on_ring_change(old, new).await;
        wait_for_batches(&recorded, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sent: usize = recorded
            .lock()
            .iter()
            .map(|(_, batch)| batch.rows.len())
            .sum();
        assert!(sent > 0);
        // Everything streamed away was dropped locally.
        assert_eq!(store.len(), 20 - sent);
    }
}
