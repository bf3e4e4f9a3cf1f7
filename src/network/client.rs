//! Outbound side of the sync transport.
//!
//! The coordinator talks to peers through the `SyncTransport` seam so tests
//! can substitute a recording transport; `TcpSyncTransport` is the real
//! implementation over framed TCP.

use crate::error::{Result, TransportError};
use crate::network::rpc::{encode_frame_into, read_frame, SyncDataRequest, SyncDataResponse};
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Dialer for sync streams.
#[async_trait::async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    /// Open a client stream to the peer at `addr` (`host:port`).
    async fn open(&self, addr: &str) -> Result<Box<dyn SyncStream>>;
}

/// One open client-streaming call.
#[async_trait::async_trait]
pub trait SyncStream: Send {
    /// Send one batch frame.
    async fn send(&mut self, batch: &SyncDataRequest) -> Result<()>;

    /// Close the send half and drain the terminal response.
    async fn finish(self: Box<Self>) -> Result<SyncDataResponse>;
}

/// TCP implementation of the transport seam.
#[derive(Debug, Clone)]
pub struct TcpSyncTransport {
    connect_timeout: Duration,
}

impl TcpSyncTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpSyncTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait::async_trait]
impl SyncTransport for TcpSyncTransport {
    async fn open(&self, addr: &str) -> Result<Box<dyn SyncStream>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Dial {
                addr: addr.to_string(),
                reason: "connect timed out".to_string(),
            })?
            .map_err(|e| TransportError::Dial {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(TcpSyncStream {
            stream,
            buf: BytesMut::new(),
        }))
    }
}

struct TcpSyncStream {
    stream: TcpStream,
    buf: BytesMut,
}

#[async_trait::async_trait]
impl SyncStream for TcpSyncStream {
    async fn send(&mut self, batch: &SyncDataRequest) -> Result<()> {
        self.buf.clear();
        encode_frame_into(batch, &mut self.buf)?;
        self.stream
            .write_all(&self.buf)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<SyncDataResponse> {
        // Half-close: the peer sees EOF and replies with the terminal
        // response on the still-open read half.
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        match read_frame(&mut self.stream).await? {
            Some(response) => Ok(response),
            None => Err(TransportError::ConnectionClosed.into()),
        }
    }
}
