//! Consistent-hash ring view with virtual nodes and replica selection.
//!
//! Each physical node owns `virtual_node_factor` tokens derived from its
//! id. Replica selection walks the ring clockwise from a token collecting
//! distinct physical owners. The view is a plain value; `SharedRing` wraps
//! it for concurrent readers with a single writer.

use crate::config::RingConfig;
use crate::error::{Result, RingError};
use crate::ring::token::{token_for_key, Token, TokenRange};
use crate::types::{NodeId, NodeStatus, PhysicalNode};
use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

/// Ordered mapping of the token ring plus the physical node table.
#[derive(Debug, Clone)]
pub struct RingView {
    /// Virtual tokens mapped to their owning physical node.
    tokens: BTreeMap<Token, NodeId>,

    /// All known physical nodes, including Dead ones kept for rejoin.
    nodes: HashMap<NodeId, PhysicalNode>,

    config: RingConfig,
}

impl RingView {
    /// Create an empty ring.
    pub fn new(config: RingConfig) -> Self {
        Self {
            tokens: BTreeMap::new(),
            nodes: HashMap::new(),
            config,
        }
    }

    /// The configured replication factor.
    pub fn replication_factor(&self) -> usize {
        self.config.replication_factor
    }

    /// The configured virtual-node factor.
    pub fn virtual_node_factor(&self) -> usize {
        self.config.virtual_node_factor
    }

    /// Number of known physical nodes, Dead included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes currently owning tokens.
    pub fn owning_node_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.status != NodeStatus::Dead)
            .count()
    }

    /// Look up a node record.
    pub fn node(&self, id: &str) -> Option<&PhysicalNode> {
        self.nodes.get(id)
    }

    /// Whether a node record exists.
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate all node records.
    pub fn nodes(&self) -> impl Iterator<Item = &PhysicalNode> {
        self.nodes.values()
    }

    /// Add a node and insert its virtual tokens.
    ///
    /// Fails with `DuplicateNode` if the id is already known; a Dead node
    /// rejoining goes through `update_status` instead.
    pub fn add_node(&mut self, node: PhysicalNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(RingError::DuplicateNode(node.id).into());
        }

        let id = node.id.clone();
        let owns_tokens = node.status != NodeStatus::Dead;
        self.nodes.insert(id.clone(), node);
        if owns_tokens {
            self.insert_tokens(&id);
        }
        Ok(())
    }

    /// Remove a node and all of its virtual tokens. No-op if absent.
    pub fn remove_node(&mut self, id: &str) {
        if self.nodes.remove(id).is_some() {
            self.remove_tokens(id);
        }
    }

    /// Update a node's liveness.
    ///
    /// Returns `true` when the change moved tokens (a transition into or
    /// out of Dead), which is the cue to recompute placement. Unknown ids
    /// return `false`.
    pub fn update_status(&mut self, id: &str, status: NodeStatus) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };

        let was_dead = node.status == NodeStatus::Dead;
        let now_dead = status == NodeStatus::Dead;
        node.status = status;
        node.last_updated = Utc::now();

        let id = id.to_string();
        if was_dead && !now_dead {
            self.insert_tokens(&id);
            true
        } else if !was_dead && now_dead {
            self.remove_tokens(&id);
            true
        } else {
            false
        }
    }

    /// Replica set for a token: walk the ring clockwise from the first
    /// virtual token at or after `token`, collecting distinct physical
    /// owners until R are found or the ring is exhausted.
    pub fn replicas_for(&self, token: Token) -> Vec<NodeId> {
        let owners = self.walk_replicas(token);

        if !owners.is_empty() && owners.len() < self.config.replication_factor {
            warn!(
                token,
                replication_factor = self.config.replication_factor,
                available = owners.len(),
                "under-replicated: fewer owning nodes than replication factor"
            );
        }

        owners
    }

    fn walk_replicas(&self, token: Token) -> Vec<NodeId> {
        if self.tokens.is_empty() {
            return Vec::new();
        }

        let want = self.config.replication_factor;
        let available = self.owning_node_count();
        let mut owners: Vec<NodeId> = Vec::with_capacity(want.min(available));

        let walk = self
            .tokens
            .range(token..)
            .chain(self.tokens.range(..token));

        for (_, owner) in walk {
            if !owners.iter().any(|o| o == owner) {
                owners.push(owner.clone());
                if owners.len() >= want || owners.len() >= available {
                    break;
                }
            }
        }

        owners
    }

    /// Primary owner for a token.
    pub fn primary_for(&self, token: Token) -> Option<NodeId> {
        self.walk_replicas(token).into_iter().next()
    }

    /// The ranges a node must store: every virtual-node range
    /// `(predecessor(t), t]` whose replica walk includes the node.
    ///
    /// With R = 1 this is exactly the node's own virtual-node ranges.
    pub fn ranges_owned_by(&self, id: &str) -> Vec<TokenRange> {
        self.ranges_with_replicas()
            .filter_map(|(range, replicas)| {
                replicas.iter().any(|r| r.as_str() == id).then_some(range)
            })
            .collect()
    }

    /// Per-node stored ranges for every token-owning node.
    pub fn all_ranges(&self) -> HashMap<NodeId, Vec<TokenRange>> {
        let mut ranges: HashMap<NodeId, Vec<TokenRange>> = HashMap::new();
        for (range, replicas) in self.ranges_with_replicas() {
            for replica in replicas {
                ranges.entry(replica).or_default().push(range);
            }
        }
        ranges
    }

    /// Every virtual-node range paired with its replica set. The walk for
    /// any token inside `(predecessor(t), t]` starts at `t`'s virtual
    /// node, so one walk per range covers all of its tokens.
    fn ranges_with_replicas(&self) -> impl Iterator<Item = (TokenRange, Vec<NodeId>)> + '_ {
        let mut prev = self.tokens.keys().next_back().copied();
        self.tokens.keys().map(move |&t| {
            let range = TokenRange::new(prev.unwrap_or(t), t);
            prev = Some(t);
            (range, self.walk_replicas(t))
        })
    }

    /// The virtual-node range a token falls into.
    pub fn range_for(&self, token: Token) -> Option<TokenRange> {
        let min = *self.tokens.keys().next()?;
        let max = *self.tokens.keys().next_back()?;

        // Successor virtual token, wrapping past the ring maximum.
        let end = self
            .tokens
            .range(token..)
            .next()
            .map(|(&t, _)| t)
            .unwrap_or(min);
        let start = self
            .tokens
            .range(..end)
            .next_back()
            .map(|(&t, _)| t)
            .unwrap_or(max);

        Some(TokenRange::new(start, end))
    }

    /// Derive and insert the virtual tokens for a node. Collisions probe
    /// to the next free token so the ring never holds equal tokens.
    fn insert_tokens(&mut self, id: &str) {
        for i in 0..self.config.virtual_node_factor {
            let mut token = token_for_key(format!("{}:{}", id, i).as_bytes());
            while self.tokens.contains_key(&token) {
                token = token.wrapping_add(1);
            }
            self.tokens.insert(token, id.to_string());
        }
    }

    fn remove_tokens(&mut self, id: &str) {
        self.tokens.retain(|_, owner| owner.as_str() != id);
    }
}

/// Concurrently readable ring with a single writer.
///
/// Readers either take the lock briefly through the delegating methods or
/// call `snapshot()` for a consistent copy they can hold across awaits;
/// the membership observer is the only writer.
#[derive(Debug)]
pub struct SharedRing {
    inner: RwLock<RingView>,
}

impl SharedRing {
    /// Create an empty shared ring.
    pub fn new(config: RingConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            inner: RwLock::new(RingView::new(config)),
        }))
    }

    /// Create a ring pre-populated with seed nodes.
    ///
    /// Fails with `Misconfigured` when the replication factor exceeds the
    /// seed count; at runtime the same condition only degrades R with a
    /// warning.
    pub fn bootstrap(config: RingConfig, seeds: Vec<PhysicalNode>) -> Result<Arc<Self>> {
        config.validate()?;
        if config.replication_factor > seeds.len() {
            return Err(RingError::Misconfigured {
                replication_factor: config.replication_factor,
                available: seeds.len(),
            }
            .into());
        }

        let ring = Self::new(config)?;
        {
            let mut view = ring.inner.write();
            for seed in seeds {
                view.add_node(seed)?;
            }
        }
        Ok(ring)
    }

    /// A consistent, immutable copy of the current ring state.
    pub fn snapshot(&self) -> RingView {
        self.inner.read().clone()
    }

    /// Add a node directly, outside the observer's capture/trigger path.
    /// Used when seeding a ring at process start.
    pub fn add_node(&self, node: PhysicalNode) -> Result<()> {
        self.inner.write().add_node(node)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, RingView> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RingView> {
        self.inner.write()
    }

    /// Replica set for a token.
    pub fn replicas_for(&self, token: Token) -> Vec<NodeId> {
        self.inner.read().replicas_for(token)
    }

    /// Ranges owned by a node.
    pub fn ranges_owned_by(&self, id: &str) -> Vec<TokenRange> {
        self.inner.read().ranges_owned_by(id)
    }

    /// Number of known physical nodes.
    pub fn node_count(&self) -> usize {
        self.inner.read().node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> PhysicalNode {
        PhysicalNode::new(id, "127.0.0.1", 9000)
    }

    fn ring(v: usize, r: usize, ids: &[&str]) -> RingView {
        let mut view = RingView::new(RingConfig::new(v, r));
        for id in ids {
            view.add_node(node(id)).unwrap();
        }
        view
    }

    #[test]
    fn test_add_duplicate_node() {
        let mut view = ring(3, 2, &["node_0"]);
        let err = view.add_node(node("node_0")).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Ring(RingError::DuplicateNode(_))
        ));
        // Ring unchanged.
        assert_eq!(view.node_count(), 1);
    }

    #[test]
    fn test_remove_absent_node_is_noop() {
        let mut view = ring(3, 2, &["node_0"]);
        view.remove_node("node_9");
        assert_eq!(view.node_count(), 1);
    }

    #[test]
    fn test_replicas_are_distinct() {
        let view = ring(3, 2, &["node_0", "node_1", "node_2", "node_3"]);
        let replicas = view.replicas_for(token_for_key(b"some key"));
        assert_eq!(replicas.len(), 2);
        assert_ne!(replicas[0], replicas[1]);
    }

    #[test]
    fn test_replica_selection_is_deterministic() {
        let view = ring(3, 2, &["node_0", "node_1", "node_2", "node_3"]);
        let t = 13502972256853596262;
        assert_eq!(view.replicas_for(t), view.replicas_for(t));
    }

    #[test]
    fn test_add_order_is_commutative() {
        let a = ring(3, 2, &["node_0", "node_1", "node_2"]);
        let b = ring(3, 2, &["node_2", "node_0", "node_1"]);
        for t in [0, 42, u64::MAX, 4392469504148276032] {
            assert_eq!(a.replicas_for(t), b.replicas_for(t));
        }
        assert_eq!(a.all_ranges(), b.all_ranges());
    }

    #[test]
    fn test_replicas_match_owned_ranges() {
        // Every replica for a token owns a range containing it.
        let view = ring(3, 2, &["node_0", "node_1", "node_2", "node_3"]);
        let t = token_for_key(b"page_19");
        for replica in view.replicas_for(t) {
            assert!(
                view.ranges_owned_by(&replica).iter().any(|r| r.contains(t)),
                "replica {} owns no range containing {}",
                replica,
                t
            );
        }
    }

    #[test]
    fn test_under_replication_returns_all_nodes() {
        let view = ring(3, 5, &["node_0", "node_1"]);
        let replicas = view.replicas_for(7);
        assert_eq!(replicas.len(), 2);
    }

    #[test]
    fn test_full_replication_with_single_vnode() {
        // V=1 and R = node count: every node replicates every token.
        let view = ring(1, 3, &["node_0", "node_1", "node_2"]);
        for t in [0, u64::MAX, 13154972877196513132] {
            assert_eq!(view.replicas_for(t).len(), 3);
        }
    }

    #[test]
    fn test_all_ranges_cover_ring_r_times() {
        let view = ring(3, 2, &["node_0", "node_1", "node_2"]);
        let ranges = view.all_ranges();

        // 9 virtual-node ranges, each stored by R = 2 nodes.
        let total: usize = ranges.values().map(|v| v.len()).sum();
        assert_eq!(total, 18);

        // Any token is stored by exactly R distinct nodes.
        for t in [0, 1, u64::MAX, 4392469504148276032] {
            let holders = ranges
                .iter()
                .filter(|(_, owned)| owned.iter().any(|r| r.contains(t)))
                .count();
            assert_eq!(holders, 2, "token {} must be stored by exactly R nodes", t);
        }
    }

    #[test]
    fn test_dead_node_owns_no_tokens() {
        let mut view = ring(3, 2, &["node_0", "node_1", "node_2"]);
        let owned_before = view.ranges_owned_by("node_1");
        assert!(!owned_before.is_empty());

        assert!(view.update_status("node_1", NodeStatus::Dead));
        assert!(view.ranges_owned_by("node_1").is_empty());
        assert_eq!(view.owning_node_count(), 2);
        // Still known for rejoin.
        assert!(view.contains_node("node_1"));

        assert!(view.update_status("node_1", NodeStatus::Alive));
        assert_eq!(view.ranges_owned_by("node_1"), owned_before);
    }

    #[test]
    fn test_suspect_does_not_move_tokens() {
        let mut view = ring(3, 2, &["node_0", "node_1"]);
        let owned_before = view.ranges_owned_by("node_1");
        assert!(!view.update_status("node_1", NodeStatus::Suspect));
        assert_eq!(view.ranges_owned_by("node_1"), owned_before);
    }

    #[test]
    fn test_rebuild_after_death_matches_fresh_ring() {
        let mut mutated = ring(3, 2, &["node_0", "node_1", "node_2"]);
        mutated.update_status("node_1", NodeStatus::Dead);

        let fresh = ring(3, 2, &["node_0", "node_2"]);
        for t in [0, 99, u64::MAX / 2, u64::MAX] {
            assert_eq!(mutated.replicas_for(t), fresh.replicas_for(t));
        }
    }

    #[test]
    fn test_range_for_matches_ownership() {
        let view = ring(3, 2, &["node_0", "node_1", "node_2"]);
        for t in [0, 42, u64::MAX / 3, u64::MAX] {
            let range = view.range_for(t).unwrap();
            assert!(range.contains(t));
            // The range's replica set stores the token.
            for replica in view.replicas_for(range.end) {
                assert!(view.ranges_owned_by(&replica).contains(&range));
            }
        }

        assert!(RingView::new(RingConfig::new(3, 2)).range_for(7).is_none());
    }

    #[test]
    fn test_bootstrap_rejects_excess_replication() {
        let result = SharedRing::bootstrap(RingConfig::new(3, 3), vec![node("node_0")]);
        assert!(matches!(
            result.unwrap_err(),
            crate::Error::Ring(RingError::Misconfigured { .. })
        ));
    }

    #[test]
    fn test_snapshot_is_isolated_from_writes() {
        let shared = SharedRing::new(RingConfig::new(3, 2)).unwrap();
        shared.write().add_node(node("node_0")).unwrap();

        let snap = shared.snapshot();
        shared.write().add_node(node("node_1")).unwrap();

        assert_eq!(snap.node_count(), 1);
        assert_eq!(shared.node_count(), 2);
    }
}
