/// Shared types for peerdrop peers.
///
/// `models` holds the transfer records, `wire` the JSON control messages that
/// travel over a data channel, and `events` what a session reports to its UI.

pub mod events;
pub mod models;
pub mod wire;

pub use events::{Direction, TransferEvent};
pub use models::{Ack, ChunkHeader, TransferId, TransferMetadata, total_chunks};
pub use wire::ControlMessage;
