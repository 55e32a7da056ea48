/// Data channel abstraction.
///
/// The transfer core only needs to push messages into a channel and to be
/// told what arrived. Transports (a WebRTC data channel, the in-memory link
/// in [`memory`]) implement [`ChannelAdapter`] and feed [`ChannelEvent`]s to
/// a session.

pub mod memory;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use peerdrop_types::{ChunkHeader, ControlMessage};

use crate::error::{ChannelError, CodecError, TransferError};
use crate::protocol::encode_frame;

/// One message on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

/// What a transport reports to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Close,
    Message(Message),
}

/// Delivery guarantee of a channel, declared by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    ReliableOrdered,
    UnreliableUnordered,
}

/// How chunk headers and payloads are put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    /// Header and payload packed into one binary frame.
    Packed,
    /// JSON header text message, then the raw payload as a binary message.
    /// Only valid on reliable ordered channels.
    Paired,
}

impl WireMode {
    /// Whether this mode can run over a channel with the given delivery.
    pub fn supports(self, delivery: Delivery) -> bool {
        match self {
            WireMode::Packed => true,
            WireMode::Paired => delivery == Delivery::ReliableOrdered,
        }
    }
}

impl FromStr for WireMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "packed" => Ok(WireMode::Packed),
            "paired" => Ok(WireMode::Paired),
            other => Err(format!("unknown wire mode '{}', expected packed or paired", other)),
        }
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireMode::Packed => f.write_str("packed"),
            WireMode::Paired => f.write_str("paired"),
        }
    }
}

/// A bidirectional, message-oriented channel.
///
/// `send` may be called from several tasks at once; implementations
/// serialize messages themselves.
pub trait ChannelAdapter: Send + Sync {
    /// Queue a message. Fails with [`ChannelError::Closed`] when not open.
    fn send(&self, message: Message) -> Result<(), ChannelError>;

    /// Delivery guarantee of this channel.
    fn delivery(&self) -> Delivery;

    /// Close the channel. Both ends should then observe [`ChannelEvent::Close`].
    fn close(&self) {}
}

/// Writes control messages and chunks to a channel in its wire mode.
#[derive(Clone, Copy)]
pub struct Outbox<'a> {
    channel: &'a dyn ChannelAdapter,
    mode: WireMode,
}

impl<'a> Outbox<'a> {
    pub fn new(channel: &'a dyn ChannelAdapter, mode: WireMode) -> Self {
        Self { channel, mode }
    }

    /// Send a JSON control message as text.
    pub fn send_control(&self, message: &ControlMessage) -> Result<(), TransferError> {
        let text = message.to_json().map_err(CodecError::Encode)?;
        self.channel.send(Message::Text(text))?;
        Ok(())
    }

    /// Send one chunk, framed for this channel's wire mode.
    pub fn send_chunk(&self, header: ChunkHeader, payload: &Bytes) -> Result<(), TransferError> {
        let header = ControlMessage::Chunk(header);
        match self.mode {
            WireMode::Packed => {
                let frame = encode_frame(&header, payload)?;
                self.channel.send(Message::Binary(frame))?;
            }
            WireMode::Paired => {
                self.send_control(&header)?;
                self.channel.send(Message::Binary(payload.clone()))?;
            }
        }
        Ok(())
    }
}
