use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one file transfer. Generated by the sending peer; every chunk
/// index and ACK is scoped to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Random (v4) id, unique across both peers' concurrent transfers.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TransferId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Number of chunks a file of `file_size` bytes splits into.
/// Returns `None` for a zero chunk size or a count that does not fit in `u32`.
pub fn total_chunks(file_size: u64, chunk_size: u32) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    let chunks = file_size.div_ceil(chunk_size as u64);
    u32::try_from(chunks).ok()
}

/// Describes a file about to be sent. Always the first message of a transfer
/// and never changed after it is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    #[serde(rename = "fileId")]
    pub transfer_id: TransferId,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: u64,
    pub chunk_size: u32,
    pub total_chunks: u32,
    /// Hex SHA-256 of the whole file. Older peers leave it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl TransferMetadata {
    /// Byte length chunk `index` must have, or `None` if the index is out of range.
    pub fn chunk_len(&self, index: u32) -> Option<usize> {
        if index >= self.total_chunks {
            return None;
        }
        let offset = index as u64 * self.chunk_size as u64;
        let len = self.file_size.saturating_sub(offset).min(self.chunk_size as u64);
        Some(len as usize)
    }

    /// Whether `total_chunks` is consistent with `file_size` and `chunk_size`.
    pub fn is_consistent(&self) -> bool {
        total_chunks(self.file_size, self.chunk_size) == Some(self.total_chunks)
    }
}

/// Header of one chunk transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkHeader {
    #[serde(rename = "fileId")]
    pub transfer_id: TransferId,
    pub chunk_index: u32,
}

/// Receiver's confirmation that a chunk is buffered. Sent for every delivery,
/// duplicates included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(rename = "fileId")]
    pub transfer_id: TransferId,
    pub chunk_index: u32,
}
