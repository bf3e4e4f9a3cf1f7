//! Per-range handoff task.
//!
//! Each handoff streams one token range's rows to one peer. The task is
//! independent: a failure marks this handoff `Failed` and is retried on
//! the next ring change, without touching sibling handoffs.

use crate::config::HandoffConfig;
use crate::error::{Error, Result, TransportError};
use crate::network::client::{SyncStream, SyncTransport};
use crate::network::rpc::SyncDataRequest;
use crate::ring::TokenRange;
use crate::types::{NodeId, PhysicalNode, Row};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of a handoff task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    Pending,
    Connecting,
    Streaming,
    Draining,
    Done,
    Failed,
}

impl HandoffState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandoffState::Done | HandoffState::Failed)
    }
}

pub(crate) struct Handoff {
    local_id: NodeId,
    peer: PhysicalNode,
    range: TokenRange,
    state: HandoffState,
}

impl Handoff {
    pub(crate) fn new(local_id: NodeId, peer: PhysicalNode, range: TokenRange) -> Self {
        Self {
            local_id,
            peer,
            range,
            state: HandoffState::Pending,
        }
    }

    pub(crate) fn state(&self) -> HandoffState {
        self.state
    }

    fn transition(&mut self, next: HandoffState) {
        debug!(
            peer = %self.peer.id,
            range = %self.range,
            from = ?self.state,
            to = ?next,
            "handoff state"
        );
        self.state = next;
    }

    /// Force the task into `Failed` unless it already finished.
    pub(crate) fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.transition(HandoffState::Failed);
        }
    }

    /// Stream `rows` to the peer in bounded batches.
    ///
    /// Returns the number of rows sent. Cancellation is observed at batch
    /// boundaries; each batch send runs under `batch_timeout`.
    pub(crate) async fn run(
        &mut self,
        rows: Vec<Row>,
        transport: &dyn SyncTransport,
        config: &HandoffConfig,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        match self.drive(rows, transport, config, cancel).await {
            Ok(sent) => {
                self.transition(HandoffState::Done);
                Ok(sent)
            }
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    async fn drive(
        &mut self,
        rows: Vec<Row>,
        transport: &dyn SyncTransport,
        config: &HandoffConfig,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.transition(HandoffState::Connecting);
        let mut stream = transport.open(&self.peer.addr()).await?;

        self.transition(HandoffState::Streaming);
        let mut sent = 0;
        for chunk in rows.chunks(config.max_batch_size.max(1)) {
            let batch = SyncDataRequest::new(self.local_id.clone(), chunk);

            tokio::select! {
                result = tokio::time::timeout(config.batch_timeout, stream.send(&batch)) => {
                    match result {
                        Ok(Ok(())) => sent += chunk.len(),
                        Ok(Err(e)) => return Err(e),
                        Err(_) => return Err(Error::Timeout),
                    }
                }
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }

        self.transition(HandoffState::Draining);
        let response = tokio::time::timeout(config.batch_timeout, stream.finish())
            .await
            .map_err(|_| Error::Timeout)??;

        if !response.is_success() {
            // Inserts the peer already applied stand; only the handoff is
            // marked failed so the next ring event retries it.
            warn!(
                peer = %self.peer.id,
                range = %self.range,
                message = %response.message,
                "peer rejected sync stream"
            );
            return Err(TransportError::ReceiveFailed(response.message).into());
        }

        Ok(sent)
    }
}
