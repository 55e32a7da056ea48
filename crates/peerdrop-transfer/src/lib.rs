/// PeerDrop transfer core: reliable file transfer over a peer data channel.
///
/// Provides chunked file transfer on top of any message channel with:
/// - Length-prefixed frames carrying a JSON header and raw payload
/// - Packed (one frame per chunk) or paired (header, then payload) wire modes
/// - Sliding-window sender with per-chunk ACKs and fixed-timeout retransmission
/// - Duplicate-safe out-of-order reassembly
/// - Many concurrent transfers per channel, in both directions
/// - Optional SHA-256 integrity verification

pub mod bitfield;
pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod session;
pub mod slicer;

#[cfg(test)]
mod test_util;

// Re-export key types for convenience.
pub use bitfield::ChunkBitfield;
pub use channel::memory::{Endpoint, LinkConfig, MemoryChannel};
pub use channel::{ChannelAdapter, ChannelEvent, Delivery, Message, Outbox, WireMode};
pub use config::TransferConfig;
pub use error::{ChannelError, CodecError, TransferError};
pub use logging::{NullLogger, TracingLogger, TransferLogger};
pub use protocol::{
    decode_frame, encode_frame, frame_len, DEFAULT_CHUNK_SIZE, DEFAULT_RETRANSMIT_MS,
    DEFAULT_WINDOW_SIZE, LEN_PREFIX, MAX_HEADER_LEN,
};
pub use receiver::{ChunkOutcome, InboundTransfer, PendingHeader};
pub use registry::TransferRegistry;
pub use sender::{AckOutcome, OutboundTransfer, SenderState};
pub use session::{Command, Session, SessionHandle, SpawnedSession, spawn};
pub use slicer::{ChunkLoaded, ChunkRead, ChunkSource, FileSource, PreparedSource, Slicer};
