use std::io;

use thiserror::Error;

use crate::protocol::MAX_HEADER_LEN;

/// The channel refused a message.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not open")]
    Closed,
}

/// Frame packing and unpacking failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot serialize header: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("header is {0} bytes, limit is {max}", max = MAX_HEADER_LEN)]
    HeaderTooLarge(usize),

    #[error("frame truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("invalid header: {0}")]
    Decode(#[source] serde_json::Error),
}

impl CodecError {
    /// True for failures on the encoding side.
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encode(_) | Self::HeaderTooLarge(_))
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("cannot read chunk {index}: {source}")]
    Read {
        index: u32,
        #[source]
        source: io::Error,
    },

    #[error("empty files are not allowed")]
    EmptyFile,

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid chunk {index}: {reason}")]
    InvalidChunk { index: u32, reason: String },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("chunk {index} unacknowledged after {attempts} retransmits")]
    RetriesExhausted { index: u32, attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("paired wire mode needs a reliable ordered channel")]
    ModeMismatch,

    #[error("session is closed")]
    SessionClosed,
}
