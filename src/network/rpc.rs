//! Wire types and framing for the `SyncData` stream.
//!
//! Frames are a 4-byte big-endian length prefix followed by a bincode
//! payload. A sync stream is client-streaming: any number of
//! `SyncDataRequest` frames, a write-half close, then a single
//! `SyncDataResponse` back.

use crate::error::{Error, Result, TransportError};
use crate::types::{NodeId, Row};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Keys every wire row must carry.
const REQUIRED_KEYS: [&str; 7] = [
    "page_id",
    "component_id",
    "timestamp",
    "event",
    "created_at",
    "updated_at",
    "hash_key",
];

/// A row as transmitted: a flat string map.
///
/// `hash_key` is the decimal string of the placement token; timestamps are
/// RFC-3339.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowRecord {
    pub data: HashMap<String, String>,
}

impl RowRecord {
    /// Encode a typed row for transmission.
    pub fn from_row(row: &Row) -> Self {
        let mut data = HashMap::with_capacity(REQUIRED_KEYS.len());
        data.insert("page_id".to_string(), row.page_id.clone());
        data.insert("component_id".to_string(), row.component_id.clone());
        data.insert("timestamp".to_string(), row.timestamp.to_rfc3339());
        data.insert("event".to_string(), row.event.clone());
        data.insert("created_at".to_string(), row.created_at.to_rfc3339());
        data.insert("updated_at".to_string(), row.updated_at.to_rfc3339());
        data.insert("hash_key".to_string(), row.hash_key.to_string());
        Self { data }
    }

    fn get(&self, key: &str) -> Result<&str> {
        self.data
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| Error::RowMalformed(format!("missing key {}", key)))
    }

    fn get_timestamp(&self, key: &str) -> Result<DateTime<Utc>> {
        let raw = self.get(key)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::RowMalformed(format!("bad {}: {}", key, e)))
    }
}

impl TryFrom<RowRecord> for Row {
    type Error = Error;

    fn try_from(record: RowRecord) -> Result<Self> {
        let hash_key = record
            .get("hash_key")?
            .parse::<u64>()
            .map_err(|e| Error::RowMalformed(format!("bad hash_key: {}", e)))?;

        Ok(Row {
            page_id: record.get("page_id")?.to_string(),
            component_id: record.get("component_id")?.to_string(),
            timestamp: record.get_timestamp("timestamp")?,
            event: record.get("event")?.to_string(),
            created_at: record.get_timestamp("created_at")?,
            updated_at: record.get_timestamp("updated_at")?,
            hash_key,
        })
    }
}

/// One batch of a sync stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDataRequest {
    /// The streaming node's id.
    pub sender_id: NodeId,

    /// Rows in this batch.
    pub rows: Vec<RowRecord>,
}

impl SyncDataRequest {
    /// Build a batch from typed rows.
    pub fn new(sender_id: impl Into<NodeId>, rows: &[Row]) -> Self {
        Self {
            sender_id: sender_id.into(),
            rows: rows.iter().map(RowRecord::from_row).collect(),
        }
    }
}

/// Terminal status of a sync stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Error,
}

/// The single terminal response of a sync stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncDataResponse {
    pub status: SyncStatus,
    pub message: String,
}

impl SyncDataResponse {
    /// Create a success response.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Success,
            message: message.into(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Error,
            message: message.into(),
        }
    }

    /// Whether the stream was accepted.
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

/// Encode a message with its length prefix.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let data = bincode::serialize(msg)?;
    let mut framed = Vec::with_capacity(4 + data.len());
    framed.extend_from_slice(&(data.len() as u32).to_be_bytes());
    framed.extend_from_slice(&data);
    Ok(framed)
}

/// Encode a message directly into a reusable buffer, returning the number
/// of bytes written. Avoids the intermediate allocation of `encode_frame`
/// on the batch send path.
pub fn encode_frame_into<T: Serialize>(msg: &T, buffer: &mut bytes::BytesMut) -> Result<usize> {
    let size = bincode::serialized_size(msg)? as usize;

    buffer.reserve(4 + size);
    buffer.extend_from_slice(&(size as u32).to_be_bytes());

    let start = buffer.len();
    buffer.resize(start + size, 0);

    let mut cursor = std::io::Cursor::new(&mut buffer[start..]);
    bincode::serialize_into(&mut cursor, msg)?;

    Ok(4 + size)
}

/// Decode a frame payload.
pub fn decode_frame<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(data)?)
}

/// Write one framed message.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let framed = encode_frame(msg)?;
    writer
        .write_all(&framed)
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
    Ok(())
}

/// Read one framed message.
///
/// Returns `None` on a clean end-of-stream (EOF at a frame boundary).
/// EOF inside a frame, or an oversized frame, is an error.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::Io(e).into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::ReceiveFailed(format!("frame too large: {} bytes", len)).into());
    }

    let mut data = vec![0u8; len];
    reader
        .read_exact(&mut data)
        .await
        .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

    decode_frame(&data).map(Some)
}

/// Source of inbound sync batches, abstracted over the connection.
#[async_trait::async_trait]
pub trait BatchSource: Send {
    /// Next batch, or `None` once the sender has closed its write half.
    async fn next(&mut self) -> Result<Option<SyncDataRequest>>;
}

/// A `BatchSource` reading framed requests from an async reader.
pub struct FramedBatchSource<R> {
    reader: R,
}

impl<R> FramedBatchSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> BatchSource for FramedBatchSource<R> {
    async fn next(&mut self) -> Result<Option<SyncDataRequest>> {
        read_frame(&mut self.reader).await
    }
}
