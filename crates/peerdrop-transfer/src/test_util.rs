use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use peerdrop_types::{Ack, ChunkHeader, ControlMessage};

use crate::channel::{ChannelAdapter, Delivery, Message};
use crate::error::ChannelError;
use crate::protocol::decode_frame;

/// Channel that records everything sent on it.
pub struct RecordingChannel {
    delivery: Delivery,
    open: AtomicBool,
    sent: Mutex<Vec<Message>>,
}

impl RecordingChannel {
    pub fn new(delivery: Delivery) -> Self {
        Self {
            delivery,
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Drain the recorded messages.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Drain and decode packed chunk frames, ignoring everything else.
    pub fn take_chunks(&self) -> Vec<(ChunkHeader, Bytes)> {
        self.take()
            .into_iter()
            .filter_map(|msg| match msg {
                Message::Binary(frame) => match decode_frame::<ControlMessage>(frame) {
                    Ok((ControlMessage::Chunk(header), payload)) => Some((header, payload)),
                    _ => None,
                },
                Message::Text(_) => None,
            })
            .collect()
    }

    /// Drain and decode text control messages, ignoring everything else.
    pub fn take_control(&self) -> Vec<ControlMessage> {
        self.take()
            .into_iter()
            .filter_map(|msg| match msg {
                Message::Text(text) => ControlMessage::from_json(&text).ok(),
                Message::Binary(_) => None,
            })
            .collect()
    }

    /// Drain and collect the ACKs that were sent.
    pub fn take_acks(&self) -> Vec<Ack> {
        self.take_control()
            .into_iter()
            .filter_map(|msg| match msg {
                ControlMessage::Ack(ack) => Some(ack),
                _ => None,
            })
            .collect()
    }
}

impl ChannelAdapter for RecordingChannel {
    fn send(&self, message: Message) -> Result<(), ChannelError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn delivery(&self) -> Delivery {
        self.delivery
    }
}
