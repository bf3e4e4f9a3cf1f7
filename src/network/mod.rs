//! Framed TCP transport for the `SyncData` stream.

pub mod client;
pub mod rpc;
pub mod server;

pub use client::{SyncStream, SyncTransport, TcpSyncTransport};
pub use rpc::{
    BatchSource, FramedBatchSource, RowRecord, SyncDataRequest, SyncDataResponse, SyncStatus,
};
pub use server::{StreamHandler, SyncServer};
