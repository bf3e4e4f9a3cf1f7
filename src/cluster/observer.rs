//! Membership observer: turns gossip events into ring mutations and
//! redistribution triggers.
//!
//! Every mutation that moves tokens captures the per-node ranges before
//! and after under one short write section, then hands the pair to the
//! redistribution coordinator on a spawned task, so the gossip loop never
//! waits on streaming.

use crate::cluster::events::{MembershipEvent, MembershipListener};
use crate::error::Result;
use crate::redistribution::RedistributionCoordinator;
use crate::ring::{RingView, SharedRing};
use crate::types::{NodeStatus, PhysicalNode};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Applies membership events to the shared ring.
pub struct MembershipObserver {
    ring: Arc<SharedRing>,
    coordinator: Arc<RedistributionCoordinator>,
}

impl MembershipObserver {
    pub fn new(
        ring: Arc<SharedRing>,
        coordinator: Arc<RedistributionCoordinator>,
    ) -> Arc<Self> {
        Arc::new(Self { ring, coordinator })
    }

    /// Apply one membership event.
    ///
    /// Must be called from within the tokio runtime: redistribution is
    /// spawned, not awaited. The only surfaced failure is `DuplicateNode`;
    /// other anomalies are logged and absorbed so the gossip loop keeps
    /// running.
    pub fn observe(&self, event: MembershipEvent) -> Result<()> {
        match event {
            MembershipEvent::NodeJoined(node) => self.on_joined(node),
            MembershipEvent::NodeMarkedDead(id) => {
                self.on_status(&id, NodeStatus::Dead);
                Ok(())
            }
            MembershipEvent::NodeStatusChanged(id, status) => {
                self.on_status(&id, status);
                Ok(())
            }
        }
    }

    fn on_joined(&self, node: PhysicalNode) -> Result<()> {
        let id = node.id.clone();
        self.mutate_and_trigger(|view| {
            if let Some(known) = view.node(&node.id) {
                if known.status != NodeStatus::Dead {
                    // Surfaced to the gossip caller; ring unchanged.
                    return view.add_node(node).map(|_| false);
                }
                // A dead node re-joining: refresh its record and tokens.
                info!(node_id = %node.id, "dead node rejoined");
                view.remove_node(&node.id);
            }
            view.add_node(node)?;
            Ok(true)
        })?;
        debug!(node_id = %id, "membership join applied");
        Ok(())
    }

    fn on_status(&self, id: &str, status: NodeStatus) {
        let result = self.mutate_and_trigger(|view| {
            if !view.contains_node(id) {
                warn!(node_id = %id, "status change for unknown node ignored");
                return Ok(false);
            }
            Ok(view.update_status(id, status))
        });

        // update_status cannot fail; keep the compiler honest.
        debug_assert!(result.is_ok());
    }

    /// Capture-mutate-capture under one write section, then trigger
    /// redistribution asynchronously when tokens moved.
    fn mutate_and_trigger<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut RingView) -> Result<bool>,
    {
        let (old_ranges, new_ranges) = {
            let mut view = self.ring.write();
            let old = view.all_ranges();
            if !mutate(&mut view)? {
                return Ok(());
            }
            (old, view.all_ranges())
        };

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            coordinator.on_ring_change(old_ranges, new_ranges).await;
        });
        Ok(())
    }
}

impl MembershipListener for MembershipObserver {
    fn on_event(&self, event: MembershipEvent) {
        let node_id = event.node_id().to_string();
        if let Err(e) = self.observe(event) {
            error!(node_id = %node_id, error = %e, "membership event rejected");
        }
    }
}

impl std::fmt::Debug for MembershipObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipObserver")
            .field("nodes", &self.ring.node_count())
            .finish()
    }
}
