//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries.

use serde::{Deserialize, Serialize};

use crate::error::{AccountError, Result};

/// Frame header size: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single payload, anything larger is treated as corruption
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// A single entry in the WAL
///
/// One entry is one atomic batch: on replay either every operation in
/// `operations` is applied or the frame is dropped as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operations to apply, in order
    pub operations: Vec<Operation>,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    /// The key this operation touches
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// What bincode actually sees; the LSN lives in the frame header.
#[derive(Deserialize)]
struct Payload {
    operations: Vec<Operation>,
    timestamp: u64,
}

/// Borrowed twin of `Payload`, encodes identically
#[derive(Serialize)]
struct PayloadRef<'a> {
    operations: &'a [Operation],
    timestamp: u64,
}

impl WalEntry {
    /// Create an entry holding a single operation
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self::batch(lsn, vec![operation])
    }

    /// Create an entry holding an atomic batch of operations
    pub fn batch(lsn: u64, operations: Vec<Operation>) -> Self {
        Self {
            lsn,
            operations,
            timestamp: now_millis(),
        }
    }

    /// Serialize into a full frame: header followed by payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        encode_frame(self.lsn, &self.operations, self.timestamp)
    }

    /// Deserialize a full frame, verifying length and checksum
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::parse(bytes)?;
        let body = &bytes[HEADER_SIZE..];
        if body.len() != header.len as usize {
            return Err(AccountError::WalCorruption(format!(
                "payload length mismatch: header says {}, got {}",
                header.len,
                body.len()
            )));
        }
        Self::from_parts(&header, body)
    }

    /// Build an entry from an already-parsed header and its payload
    pub(super) fn from_parts(header: &FrameHeader, payload: &[u8]) -> Result<Self> {
        let crc = compute_crc(&header.lsn.to_le_bytes(), payload);
        if crc != header.crc {
            return Err(AccountError::WalCorruption(format!(
                "CRC mismatch at LSN {}: expected {:08x}, got {:08x}",
                header.lsn, header.crc, crc
            )));
        }

        let decoded: Payload = bincode::deserialize(payload)
            .map_err(|e| AccountError::WalCorruption(format!("undecodable payload: {}", e)))?;

        Ok(Self {
            lsn: header.lsn,
            operations: decoded.operations,
            timestamp: decoded.timestamp,
        })
    }
}

/// Parsed frame header
#[derive(Debug, Clone, Copy)]
pub(super) struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub(super) fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(AccountError::WalCorruption(format!(
                "incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut lsn = [0u8; 8];
        let mut crc = [0u8; 4];
        let mut len = [0u8; 4];
        lsn.copy_from_slice(&bytes[0..8]);
        crc.copy_from_slice(&bytes[8..12]);
        len.copy_from_slice(&bytes[12..16]);

        let header = Self {
            lsn: u64::from_le_bytes(lsn),
            crc: u32::from_le_bytes(crc),
            len: u32::from_le_bytes(len),
        };
        if header.len > MAX_PAYLOAD_SIZE {
            return Err(AccountError::WalCorruption(format!(
                "payload too large: {} bytes (max {})",
                header.len, MAX_PAYLOAD_SIZE
            )));
        }
        Ok(header)
    }
}

/// Encode one frame without building an owned `WalEntry`
pub(super) fn encode_frame(lsn: u64, operations: &[Operation], timestamp: u64) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&PayloadRef {
        operations,
        timestamp,
    })
    .map_err(|e| AccountError::Serialization(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| {
            AccountError::Serialization(format!("WAL payload too large: {} bytes", payload.len()))
        })?;

    let lsn_bytes = lsn.to_le_bytes();
    let crc = compute_crc(&lsn_bytes, &payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&lsn_bytes);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn compute_crc(lsn_bytes: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(lsn_bytes);
    hasher.update(payload);
    hasher.finalize()
}

pub(super) fn now_millis() -> u64 {
    let millis = chrono::Utc::now().timestamp_millis();
    u64::try_from(millis).unwrap_or(0)
}
