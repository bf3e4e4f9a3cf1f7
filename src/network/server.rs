//! TCP server for inbound sync streams.

use crate::error::{Result, TransportError};
use crate::network::rpc::{write_frame, BatchSource, FramedBatchSource, SyncDataResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Handler for one inbound sync stream.
///
/// Receives batches until the sender closes its write half and returns the
/// single terminal response the server writes back.
#[async_trait::async_trait]
pub trait StreamHandler: Send + Sync + 'static {
    async fn handle_stream(&self, source: &mut dyn BatchSource) -> SyncDataResponse;
}

/// Accept loop for the sync port.
pub struct SyncServer {
    bind_addr: SocketAddr,
    handler: Arc<dyn StreamHandler>,
    cancel: CancellationToken,
}

impl SyncServer {
    /// Create a server for `bind_addr` with the given stream handler.
    pub fn new(bind_addr: SocketAddr, handler: Arc<dyn StreamHandler>) -> Self {
        Self {
            bind_addr,
            handler,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the accept loop and open connections when
    /// cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the accept loop until cancelled.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(TransportError::Io)?;

        info!(addr = %self.bind_addr, "sync server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "accepted sync connection");
                            let handler = self.handler.clone();
                            let cancel = self.cancel.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler, cancel).await {
                                    debug!(peer = %peer_addr, error = %e, "sync connection ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept sync connection");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    info!(addr = %self.bind_addr, "sync server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(
        stream: TcpStream,
        handler: Arc<dyn StreamHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let (read_half, mut write_half) = stream.into_split();
        let mut source = FramedBatchSource::new(read_half);

        let response = tokio::select! {
            response = handler.handle_stream(&mut source) => response,
            _ = cancel.cancelled() => {
                debug!("sync connection cancelled");
                return Ok(());
            }
        };

        write_frame(&mut write_half, &response).await
    }
}
