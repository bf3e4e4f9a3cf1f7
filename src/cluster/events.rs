//! Membership events delivered by the gossip collaborator.

use crate::types::{NodeId, NodeStatus, PhysicalNode};

/// Events the membership observer consumes.
///
/// Cadence, fanout, and failure detection belong to the gossip layer; the
/// core only reacts to its conclusions.
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    /// A node joined the cluster.
    NodeJoined(PhysicalNode),

    /// A node was confirmed failed.
    NodeMarkedDead(NodeId),

    /// A node's liveness changed (including recovery to Alive).
    NodeStatusChanged(NodeId, NodeStatus),
}

impl MembershipEvent {
    /// The node the event concerns.
    pub fn node_id(&self) -> &str {
        match self {
            MembershipEvent::NodeJoined(node) => &node.id,
            MembershipEvent::NodeMarkedDead(id) => id,
            MembershipEvent::NodeStatusChanged(id, _) => id,
        }
    }
}

/// Sink for membership events.
///
/// The gossip collaborator holds this as a trait object and calls it from
/// its own loop.
pub trait MembershipListener: Send + Sync + 'static {
    fn on_event(&self, event: MembershipEvent);
}

/// Listener that only logs events.
pub struct LoggingListener;

impl MembershipListener for LoggingListener {
    fn on_event(&self, event: MembershipEvent) {
        match &event {
            MembershipEvent::NodeJoined(node) => {
                tracing::info!(node_id = %node.id, addr = %node.addr(), "node joined");
            }
            MembershipEvent::NodeMarkedDead(id) => {
                tracing::warn!(node_id = %id, "node marked dead");
            }
            MembershipEvent::NodeStatusChanged(id, status) => {
                tracing::info!(node_id = %id, status = ?status, "node status changed");
            }
        }
    }
}
