//! Streaming data redistribution across ring transitions.

mod coordinator;
mod handoff;

pub use coordinator::{RedistributionCoordinator, SyncMetrics, SyncMetricsSnapshot};
pub use handoff::HandoffState;
