//! Error types for the row store.

use crate::types::NodeId;
use std::io;
use thiserror::Error;

/// Result type alias for row store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the row store.
#[derive(Error, Debug)]
pub enum Error {
    /// Ring placement errors.
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    /// Network communication errors.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local persistence errors.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An inbound row is missing required keys or carries an unparseable
    /// hash key. Skippable: the surrounding stream continues.
    #[error("malformed row: {0}")]
    RowMalformed(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
}

/// Ring placement errors.
#[derive(Error, Debug)]
pub enum RingError {
    /// A node with this id already owns tokens on the ring.
    #[error("duplicate node: {0}")]
    DuplicateNode(NodeId),

    /// Replication factor exceeds the nodes available at construction.
    #[error("replication factor {replication_factor} exceeds {available} available nodes")]
    Misconfigured {
        replication_factor: usize,
        available: usize,
    },
}

/// Network communication errors.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not reach the peer.
    #[error("connection failed to {addr}: {reason}")]
    Dial { addr: String, reason: String },

    /// Connection was closed mid-stream.
    #[error("connection closed")]
    ConnectionClosed,

    /// Failed to send a frame.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a frame.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Frame serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Local persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Row file read/write failure.
    #[error("store io error: {0}")]
    Io(String),

    /// Row file exists but does not parse.
    #[error("corrupt row file {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Transport(TransportError::Serialization(e.to_string()))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Transport(TransportError::Io(e))
    }
}
