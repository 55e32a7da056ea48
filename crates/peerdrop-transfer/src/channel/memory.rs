/// In-process data channel pair.
///
/// Two [`MemoryChannel`]s joined by unbounded queues. Binary messages can be
/// dropped or held back to simulate an unreliable unordered transport; text
/// messages are always delivered in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use super::{ChannelAdapter, ChannelEvent, Delivery, Message};
use crate::error::ChannelError;

/// Link behaviour shared by both ends.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    pub delivery: Delivery,
    /// Probability that a binary message is dropped.
    pub loss: f64,
    /// Probability that a binary message is held back behind the next one.
    pub reorder: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            delivery: Delivery::ReliableOrdered,
            loss: 0.0,
            reorder: 0.0,
        }
    }
}

impl LinkConfig {
    /// Unreliable unordered link with the given loss and reorder rates.
    pub fn lossy(loss: f64, reorder: f64) -> Self {
        LinkConfig {
            delivery: Delivery::UnreliableUnordered,
            loss: loss.clamp(0.0, 1.0),
            reorder: reorder.clamp(0.0, 1.0),
        }
    }
}

/// One side of a link: the adapter to send on and the events arriving at it.
pub struct Endpoint {
    pub channel: MemoryChannel,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

/// Build two connected, open endpoints. Each already has an `Open` event queued.
pub fn pair(config: LinkConfig) -> (Endpoint, Endpoint) {
    let open = Arc::new(AtomicBool::new(true));
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let _ = a_tx.send(ChannelEvent::Open);
    let _ = b_tx.send(ChannelEvent::Open);

    let a = MemoryChannel {
        open: open.clone(),
        config,
        local_tx: a_tx.clone(),
        peer_tx: b_tx.clone(),
        held: Mutex::new(None),
    };
    let b = MemoryChannel {
        open,
        config,
        local_tx: b_tx,
        peer_tx: a_tx,
        held: Mutex::new(None),
    };

    (
        Endpoint { channel: a, events: a_rx },
        Endpoint { channel: b, events: b_rx },
    )
}

/// Sending half of one endpoint.
pub struct MemoryChannel {
    open: Arc<AtomicBool>,
    config: LinkConfig,
    local_tx: mpsc::UnboundedSender<ChannelEvent>,
    peer_tx: mpsc::UnboundedSender<ChannelEvent>,
    /// Binary message waiting to be delivered after the next one.
    held: Mutex<Option<Message>>,
}

impl MemoryChannel {
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn deliver(&self, message: Message) -> Result<(), ChannelError> {
        self.peer_tx
            .send(ChannelEvent::Message(message))
            .map_err(|_| ChannelError::Closed)
    }
}

impl ChannelAdapter for MemoryChannel {
    fn send(&self, message: Message) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }

        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        if let Message::Binary(ref data) = message {
            if self.config.loss > 0.0 && rand::random::<f64>() < self.config.loss {
                trace!(len = data.len(), "link dropped binary message");
                return Ok(());
            }
            if self.config.delivery == Delivery::UnreliableUnordered
                && held.is_none()
                && self.config.reorder > 0.0
                && rand::random::<f64>() < self.config.reorder
            {
                *held = Some(message);
                return Ok(());
            }
        }

        self.deliver(message)?;
        if let Some(late) = held.take() {
            self.deliver(late)?;
        }
        Ok(())
    }

    fn delivery(&self) -> Delivery {
        self.config.delivery
    }

    /// Both ends observe a `Close` event; later sends fail.
    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.held.lock().unwrap_or_else(PoisonError::into_inner).take();
            let _ = self.local_tx.send(ChannelEvent::Close);
            let _ = self.peer_tx.send(ChannelEvent::Close);
        }
    }
}
