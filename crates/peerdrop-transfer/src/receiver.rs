/// Reassembly of one inbound transfer.
///
/// Chunks may arrive in any order and more than once. Each index is stored
/// at most once and counted at most once; the file is assembled only when
/// every slot is filled.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use peerdrop_types::{ChunkHeader, TransferId, TransferMetadata};
use sha2::{Digest, Sha256};

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::logging::{LogEvent, TransferLog, TransferLogger};

const COMPONENT: &str = "receiver";

/// Result of delivering a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// First copy of this index; `received` distinct chunks are now held.
    Stored { received: u32 },
    /// Index already held; the payload was discarded.
    Duplicate,
}

/// Buffers the chunks of one inbound transfer.
pub struct InboundTransfer {
    metadata: TransferMetadata,
    slots: Vec<Option<Bytes>>,
    received: u32,
    logger: Arc<dyn TransferLogger>,
}

impl std::fmt::Debug for InboundTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundTransfer")
            .field("metadata", &self.metadata)
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}

impl InboundTransfer {
    /// Accept published metadata, refusing anything inconsistent or beyond
    /// `config`'s file size and chunk count limits. Nothing is allocated for
    /// refused metadata.
    pub fn new(
        metadata: TransferMetadata,
        config: &TransferConfig,
        logger: Arc<dyn TransferLogger>,
    ) -> Result<Self, TransferError> {
        if metadata.chunk_size == 0 {
            return Err(TransferError::InvalidMetadata("chunk size is zero".into()));
        }
        if !metadata.is_consistent() {
            return Err(TransferError::InvalidMetadata(format!(
                "{} chunks of {} bytes cannot hold {} bytes",
                metadata.total_chunks, metadata.chunk_size, metadata.file_size
            )));
        }
        if metadata.file_size > config.max_file_size {
            return Err(TransferError::InvalidMetadata(format!(
                "file is {} bytes, limit is {}",
                metadata.file_size, config.max_file_size
            )));
        }
        if metadata.total_chunks > config.max_chunks {
            return Err(TransferError::InvalidMetadata(format!(
                "{} chunks, limit is {}",
                metadata.total_chunks, config.max_chunks
            )));
        }

        let transfer = Self {
            slots: vec![None; metadata.total_chunks as usize],
            received: 0,
            metadata,
            logger,
        };
        transfer.log(LogEvent::MetadataReceived {
            file_name: transfer.metadata.file_name.clone(),
            file_size: transfer.metadata.file_size,
            total_chunks: transfer.metadata.total_chunks,
        });
        Ok(transfer)
    }

    pub fn id(&self) -> TransferId {
        self.metadata.transfer_id
    }

    pub fn metadata(&self) -> &TransferMetadata {
        &self.metadata
    }

    /// Distinct chunks held so far.
    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn total_chunks(&self) -> u32 {
        self.metadata.total_chunks
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.metadata.total_chunks
    }

    /// Store chunk `index` if it is new. A chunk whose index is out of range
    /// or whose length differs from what the metadata implies is rejected.
    pub fn on_chunk(&mut self, index: u32, payload: Bytes) -> Result<ChunkOutcome, TransferError> {
        let expected = self.metadata.chunk_len(index).ok_or_else(|| TransferError::InvalidChunk {
            index,
            reason: format!("transfer has {} chunks", self.metadata.total_chunks),
        })?;
        if payload.len() != expected {
            return Err(TransferError::InvalidChunk {
                index,
                reason: format!("{} bytes, expected {}", payload.len(), expected),
            });
        }

        let slot = &mut self.slots[index as usize];
        if slot.is_some() {
            self.log(LogEvent::DuplicateChunk { chunk_idx: index });
            return Ok(ChunkOutcome::Duplicate);
        }
        *slot = Some(payload);
        self.received += 1;
        self.log(LogEvent::ChunkStored {
            chunk_idx: index,
            received: self.received,
        });
        Ok(ChunkOutcome::Stored {
            received: self.received,
        })
    }

    /// Concatenate the chunks in index order and check the digest if the
    /// sender supplied one.
    pub fn assemble(self) -> Result<Bytes, TransferError> {
        if !self.is_complete() {
            return Err(TransferError::InvalidMetadata(format!(
                "assembled with {} of {} chunks",
                self.received, self.metadata.total_chunks
            )));
        }

        let len = self.slots.iter().flatten().map(Bytes::len).sum();
        let mut file = BytesMut::with_capacity(len);
        for chunk in self.slots.iter().flatten() {
            file.extend_from_slice(chunk);
        }

        if let Some(expected) = &self.metadata.sha256 {
            let actual = hex::encode(Sha256::digest(&file));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(TransferError::IntegrityMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        self.log(LogEvent::TransferComplete {
            total_bytes: file.len() as u64,
            retransmits: 0,
        });
        Ok(file.freeze())
    }

    fn log(&self, event: LogEvent) {
        self.logger.log(TransferLog {
            component: COMPONENT,
            transfer_id: Some(self.id()),
            event,
        });
    }
}

/// Header waiting for its payload in paired wire mode.
///
/// One slot per channel. Paired mode only runs on ordered channels, so the
/// next binary message always belongs to the last header.
#[derive(Debug, Default)]
pub struct PendingHeader {
    slot: Option<ChunkHeader>,
}

impl PendingHeader {
    /// Remember `header`, returning any earlier header that never got a payload.
    pub fn set(&mut self, header: ChunkHeader) -> Option<ChunkHeader> {
        self.slot.replace(header)
    }

    /// Take the header the next payload belongs to.
    pub fn take(&mut self) -> Option<ChunkHeader> {
        self.slot.take()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}
