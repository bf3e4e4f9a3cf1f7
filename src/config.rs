//! Configuration types for ring placement and redistribution.

use crate::error::{Error, Result};
use std::time::Duration;

/// Environment variable controlling the handoff batch size.
pub const MAX_BATCH_SIZE_ENV: &str = "MAX_BATCH_SIZE";

/// Default number of rows per sync batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Ring parameters, fixed at construction by the host process.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Virtual tokens per physical node (V).
    pub virtual_node_factor: usize,

    /// Distinct physical replicas per token (R).
    pub replication_factor: usize,
}

impl RingConfig {
    /// Create a ring configuration.
    pub fn new(virtual_node_factor: usize, replication_factor: usize) -> Self {
        Self {
            virtual_node_factor,
            replication_factor,
        }
    }

    /// Set the virtual-node factor.
    pub fn with_virtual_node_factor(mut self, v: usize) -> Self {
        self.virtual_node_factor = v;
        self
    }

    /// Set the replication factor.
    pub fn with_replication_factor(mut self, r: usize) -> Self {
        self.replication_factor = r;
        self
    }

    /// Both factors must be at least 1.
    pub fn validate(&self) -> Result<()> {
        if self.virtual_node_factor == 0 {
            return Err(Error::Config(
                "virtual_node_factor must be at least 1".to_string(),
            ));
        }
        if self.replication_factor == 0 {
            return Err(Error::Config(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// Tuning for outgoing handoff streams.
#[derive(Debug, Clone)]
pub struct HandoffConfig {
    /// Maximum rows per sync batch.
    pub max_batch_size: usize,

    /// Deadline for sending a single batch.
    pub batch_timeout: Duration,

    /// Deadline for a whole per-range stream.
    pub stream_timeout: Duration,

    /// Deadline for dialing a peer.
    pub connect_timeout: Duration,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_timeout: Duration::from_secs(5),
            stream_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl HandoffConfig {
    /// Build a config taking the batch size from `MAX_BATCH_SIZE`.
    ///
    /// Absent, non-numeric, or non-positive values fall back to the
    /// default of 100.
    pub fn from_env() -> Self {
        let max_batch_size = std::env::var(MAX_BATCH_SIZE_ENV)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE);

        Self {
            max_batch_size,
            ..Default::default()
        }
    }

    /// Set the batch size explicitly.
    pub fn with_max_batch_size(mut self, n: usize) -> Self {
        self.max_batch_size = n;
        self
    }

    /// Set the per-batch send deadline.
    pub fn with_batch_timeout(mut self, d: Duration) -> Self {
        self.batch_timeout = d;
        self
    }

    /// Set the per-stream deadline.
    pub fn with_stream_timeout(mut self, d: Duration) -> Self {
        self.stream_timeout = d;
        self
    }
}
