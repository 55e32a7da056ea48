use bytes::Bytes;

use crate::models::TransferId;

/// Which side of a transfer an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Events a session reports to its UI.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// The data channel is open
    ChannelOpened,

    /// The data channel closed; every active transfer was aborted
    ChannelClosed,

    /// A peer announced a file
    IncomingStarted {
        transfer_id: TransferId,
        file_name: String,
        mime_type: String,
        file_size: u64,
        total_chunks: u32,
    },

    /// A new chunk was buffered
    IncomingProgress {
        transfer_id: TransferId,
        received: u32,
        total_chunks: u32,
    },

    /// All chunks arrived and were reassembled
    IncomingComplete {
        transfer_id: TransferId,
        file_name: String,
        mime_type: String,
        bytes: Bytes,
    },

    /// Metadata was published and the first window sent
    OutgoingStarted {
        transfer_id: TransferId,
        file_name: String,
        total_chunks: u32,
    },

    /// The peer acknowledged another chunk
    OutgoingProgress {
        transfer_id: TransferId,
        acked: u32,
        total_chunks: u32,
    },

    /// Every chunk was acknowledged
    OutgoingComplete {
        transfer_id: TransferId,
        retransmits: u64,
    },

    /// The transfer cannot continue
    Failed {
        transfer_id: TransferId,
        direction: Direction,
        reason: String,
    },

    /// The channel closed before the transfer finished
    Aborted {
        transfer_id: TransferId,
        direction: Direction,
    },

    /// Chat text from the peer
    ChatReceived { text: String },
}

impl TransferEvent {
    /// Returns the transfer this event is scoped to, if any.
    pub fn transfer_id(&self) -> Option<TransferId> {
        match self {
            Self::IncomingStarted { transfer_id, .. }
            | Self::IncomingProgress { transfer_id, .. }
            | Self::IncomingComplete { transfer_id, .. }
            | Self::OutgoingStarted { transfer_id, .. }
            | Self::OutgoingProgress { transfer_id, .. }
            | Self::OutgoingComplete { transfer_id, .. }
            | Self::Failed { transfer_id, .. }
            | Self::Aborted { transfer_id, .. } => Some(*transfer_id),
            Self::ChannelOpened | Self::ChannelClosed | Self::ChatReceived { .. } => None,
        }
    }
}
