/// Transfer logging trait for structured logs.
///
/// The registry reports every protocol step as a [`TransferLog`]; the
/// logger decides where it goes.

use std::fmt;

use peerdrop_types::TransferId;

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub transfer_id: Option<TransferId>,
    pub event: LogEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// Sender: metadata published
    MetadataSent {
        file_size: u64,
        total_chunks: u32,
    },
    /// Sender: chunk put on the wire
    ChunkSent {
        chunk_idx: u32,
        len: usize,
    },
    /// Sender: retransmit timer fired
    ChunkRetransmitted {
        chunk_idx: u32,
        attempt: u32,
    },
    /// Sender: ACK accepted
    AckReceived {
        chunk_idx: u32,
        base: u32,
    },
    /// Sender: ACK that changed nothing
    AckIgnored {
        chunk_idx: u32,
    },
    /// Receiver: metadata accepted
    MetadataReceived {
        file_name: String,
        file_size: u64,
        total_chunks: u32,
    },
    /// Receiver: chunk buffered
    ChunkStored {
        chunk_idx: u32,
        received: u32,
    },
    /// Receiver: chunk delivered again
    DuplicateChunk {
        chunk_idx: u32,
    },
    /// Frame or message discarded
    Dropped {
        reason: String,
    },
    /// Transfer complete
    TransferComplete {
        total_bytes: u64,
        retransmits: u64,
    },
    /// Channel closed under an active transfer
    TransferAborted,
    /// Error occurred
    Error {
        message: String,
    },
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetadataSent { file_size, total_chunks } => {
                write!(f, "metadata_sent size={} chunks={}", file_size, total_chunks)
            }
            Self::ChunkSent { chunk_idx, len } => {
                write!(f, "chunk_sent idx={} len={}", chunk_idx, len)
            }
            Self::ChunkRetransmitted { chunk_idx, attempt } => {
                write!(f, "chunk_retransmitted idx={} attempt={}", chunk_idx, attempt)
            }
            Self::AckReceived { chunk_idx, base } => {
                write!(f, "ack_received idx={} base={}", chunk_idx, base)
            }
            Self::AckIgnored { chunk_idx } => {
                write!(f, "ack_ignored idx={}", chunk_idx)
            }
            Self::MetadataReceived { file_name, file_size, total_chunks } => {
                write!(f, "metadata_received name={} size={} chunks={}", file_name, file_size, total_chunks)
            }
            Self::ChunkStored { chunk_idx, received } => {
                write!(f, "chunk_stored idx={} received={}", chunk_idx, received)
            }
            Self::DuplicateChunk { chunk_idx } => {
                write!(f, "duplicate_chunk idx={}", chunk_idx)
            }
            Self::Dropped { reason } => {
                write!(f, "dropped: {}", reason)
            }
            Self::TransferComplete { total_bytes, retransmits } => {
                write!(f, "transfer_complete bytes={} retransmits={}", total_bytes, retransmits)
            }
            Self::TransferAborted => f.write_str("transfer_aborted"),
            Self::Error { message } => {
                write!(f, "error: {}", message)
            }
        }
    }
}

/// Trait for transfer logging. Implementations can write to tracing,
/// collect entries, or discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        let tid = entry
            .transfer_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".into());
        // info for lifecycle, warn for drops and failures, debug for per-chunk spam
        match &entry.event {
            LogEvent::MetadataSent { .. }
            | LogEvent::MetadataReceived { .. }
            | LogEvent::TransferComplete { .. }
            | LogEvent::TransferAborted => {
                tracing::info!(component = entry.component, transfer_id = %tid, "{}", entry.event);
            }
            LogEvent::Dropped { .. } | LogEvent::Error { .. } => {
                tracing::warn!(component = entry.component, transfer_id = %tid, "{}", entry.event);
            }
            _ => {
                tracing::debug!(component = entry.component, transfer_id = %tid, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
