/// Sliding-window sender for one outbound transfer.
///
/// ```text
///            base              next_to_send
///             v                     v
/// [acked ...][ in flight (<= window) ][ not yet sent ... ] total_chunks
/// ```
///
/// Every chunk in flight has a retransmit timer. An ACK clears the timer; an
/// ACK for `base` slides `base` past every acknowledged index and refills the
/// window. ACKs are per chunk, not cumulative, so indices above `base` may be
/// acknowledged first. Timers are plain deadlines polled by the owner, so a
/// cleared timer can never fire.
///
/// The engine never reads the source itself. Chunks entering the window are
/// requested as [`ChunkRead`]s through [`OutboundTransfer::take_reads`]; the
/// owner runs them wherever blocking is allowed and hands the bytes back with
/// [`OutboundTransfer::on_chunk_loaded`]. Payloads of chunks in flight are
/// kept until acknowledged, so retransmits do not read again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use peerdrop_types::{ChunkHeader, ControlMessage, TransferId, TransferMetadata};

use crate::bitfield::ChunkBitfield;
use crate::channel::Outbox;
use crate::config::TransferConfig;
use crate::error::{ChannelError, TransferError};
use crate::logging::{LogEvent, TransferLog, TransferLogger};
use crate::slicer::{ChunkRead, Slicer};

const COMPONENT: &str = "sender";

/// Lifecycle of an outbound transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Sending,
    Complete,
    Failed,
    Aborted,
}

/// What an ACK did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Duplicate, out of range, or not expected in this state.
    Ignored,
    /// Recorded; `acked` chunks are now confirmed.
    Accepted { acked: u32 },
    /// That was the last outstanding chunk.
    Complete,
}

#[derive(Debug, Clone, Copy)]
struct RetransmitTimer {
    deadline: Instant,
    attempts: u32,
}

/// State of one outbound transfer.
pub struct OutboundTransfer {
    metadata: TransferMetadata,
    slicer: Slicer,
    window_size: u32,
    retransmit_timeout: Duration,
    max_retransmits: Option<u32>,
    state: SenderState,
    /// Lowest unacknowledged index.
    base: u32,
    /// Next index never transmitted.
    next_to_send: u32,
    acked: ChunkBitfield,
    timers: BTreeMap<u32, RetransmitTimer>,
    /// Loaded payloads of chunks not yet acknowledged.
    payloads: BTreeMap<u32, Bytes>,
    /// Reads asked for and not yet loaded.
    requested: BTreeSet<u32>,
    /// Requested reads not yet handed out by `take_reads`.
    queued: Vec<u32>,
    /// Chunks whose first read failed; they go out on their timer instead.
    unreadable: BTreeSet<u32>,
    retransmits: u64,
    logger: Arc<dyn TransferLogger>,
}

impl OutboundTransfer {
    pub fn new(
        metadata: TransferMetadata,
        slicer: Slicer,
        config: &TransferConfig,
        logger: Arc<dyn TransferLogger>,
    ) -> Self {
        let total = slicer.total_chunks();
        Self {
            metadata,
            slicer,
            window_size: config.window_size.max(1),
            retransmit_timeout: config.retransmit_timeout,
            max_retransmits: config.max_retransmits,
            state: SenderState::Idle,
            base: 0,
            next_to_send: 0,
            acked: ChunkBitfield::new(total),
            timers: BTreeMap::new(),
            payloads: BTreeMap::new(),
            requested: BTreeSet::new(),
            queued: Vec::new(),
            unreadable: BTreeSet::new(),
            retransmits: 0,
            logger,
        }
    }

    pub fn id(&self) -> TransferId {
        self.metadata.transfer_id
    }

    pub fn metadata(&self) -> &TransferMetadata {
        &self.metadata
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn total_chunks(&self) -> u32 {
        self.slicer.total_chunks()
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn next_to_send(&self) -> u32 {
        self.next_to_send
    }

    /// Chunks transmitted but not yet passed by `base`.
    pub fn in_flight(&self) -> u32 {
        self.next_to_send - self.base
    }

    pub fn acked_count(&self) -> u32 {
        self.acked.count()
    }

    pub fn retransmits(&self) -> u64 {
        self.retransmits
    }

    pub fn is_complete(&self) -> bool {
        self.state == SenderState::Complete
    }

    /// Whether chunk `index` has a pending retransmit timer.
    pub fn is_armed(&self, index: u32) -> bool {
        self.timers.contains_key(&index)
    }

    /// Earliest pending retransmit deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.deadline).min()
    }

    /// Publish the metadata and request the first window. Any failure here
    /// is fatal: there is no retransmission path for metadata.
    pub fn start(&mut self, outbox: &Outbox<'_>, now: Instant) -> Result<(), TransferError> {
        if self.state != SenderState::Idle {
            return Ok(());
        }

        if let Err(e) = outbox.send_control(&ControlMessage::Metadata(self.metadata.clone())) {
            self.fail();
            return Err(e);
        }
        self.log(LogEvent::MetadataSent {
            file_size: self.metadata.file_size,
            total_chunks: self.metadata.total_chunks,
        });

        self.state = SenderState::Sending;
        if let Err(e) = self.fill_window(outbox, now) {
            self.fail();
            return Err(e.into());
        }
        self.check_complete();
        Ok(())
    }

    /// Request reads for every free window slot, then transmit loaded chunks
    /// in index order until the window is full or the next one is still
    /// being read.
    pub fn fill_window(&mut self, outbox: &Outbox<'_>, now: Instant) -> Result<(), ChannelError> {
        let end = self
            .total_chunks()
            .min(self.base.saturating_add(self.window_size));
        for index in self.next_to_send..end {
            self.request_read(index);
        }

        while self.next_to_send < end {
            let index = self.next_to_send;
            if let Some(payload) = self.payloads.get(&index) {
                self.transmit(outbox, index, payload)?;
            } else if !self.unreadable.remove(&index) {
                break;
            }
            // Armed even if the read failed, so the timer retries it.
            self.timers.insert(
                index,
                RetransmitTimer {
                    deadline: now + self.retransmit_timeout,
                    attempts: 0,
                },
            );
            self.next_to_send += 1;
        }
        Ok(())
    }

    /// Reads requested since the last call.
    pub fn take_reads(&mut self) -> Vec<ChunkRead> {
        let id = self.id();
        std::mem::take(&mut self.queued)
            .into_iter()
            .map(|index| ChunkRead::new(id, index, self.slicer.clone()))
            .collect()
    }

    /// Accept a finished read. A chunk already on the wire is retransmitted
    /// right away; a new one joins the window in order. Reads nobody is
    /// waiting for any more are discarded.
    pub fn on_chunk_loaded(
        &mut self,
        index: u32,
        result: Result<Bytes, TransferError>,
        outbox: &Outbox<'_>,
        now: Instant,
    ) -> Result<(), ChannelError> {
        if !self.requested.remove(&index) || self.state != SenderState::Sending || self.acked.get(index) {
            return Ok(());
        }

        match result {
            Ok(payload) => {
                if index < self.next_to_send {
                    self.transmit(outbox, index, &payload)?;
                }
                self.payloads.insert(index, payload);
            }
            Err(e) => {
                self.log(LogEvent::Error { message: e.to_string() });
                if index >= self.next_to_send {
                    self.unreadable.insert(index);
                }
            }
        }
        self.fill_window(outbox, now)
    }

    /// Record an ACK, slide the window and refill it.
    pub fn on_ack(
        &mut self,
        index: u32,
        outbox: &Outbox<'_>,
        now: Instant,
    ) -> Result<AckOutcome, ChannelError> {
        if self.state != SenderState::Sending || index >= self.next_to_send || !self.acked.set(index) {
            self.log(LogEvent::AckIgnored { chunk_idx: index });
            return Ok(AckOutcome::Ignored);
        }

        self.timers.remove(&index);
        self.payloads.remove(&index);
        if index == self.base {
            self.base = self.acked.first_unset_from(self.base);
        }
        self.log(LogEvent::AckReceived {
            chunk_idx: index,
            base: self.base,
        });

        if self.check_complete() {
            return Ok(AckOutcome::Complete);
        }

        self.fill_window(outbox, now)?;
        Ok(AckOutcome::Accepted {
            acked: self.acked.count(),
        })
    }

    /// Resend every chunk whose timer expired at or before `now` and re-arm
    /// it. A chunk with no loaded payload is read again and goes out when the
    /// read comes back. Returns how many timers fired.
    pub fn poll_timers(&mut self, outbox: &Outbox<'_>, now: Instant) -> Result<usize, TransferError> {
        if self.state != SenderState::Sending {
            return Ok(0);
        }

        let due: Vec<u32> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= now)
            .map(|(&index, _)| index)
            .collect();

        for &index in &due {
            let Some(timer) = self.timers.get(&index).copied() else {
                continue;
            };
            let attempt = timer.attempts + 1;
            if let Some(max) = self.max_retransmits {
                if attempt > max {
                    self.fail();
                    return Err(TransferError::RetriesExhausted {
                        index,
                        attempts: timer.attempts,
                    });
                }
            }

            match self.payloads.get(&index).cloned() {
                Some(payload) => {
                    if let Err(e) = self.transmit(outbox, index, &payload) {
                        self.fail();
                        return Err(e.into());
                    }
                }
                None => self.request_read(index),
            }
            self.timers.insert(
                index,
                RetransmitTimer {
                    deadline: now + self.retransmit_timeout,
                    attempts: attempt,
                },
            );
            self.retransmits += 1;
            self.log(LogEvent::ChunkRetransmitted {
                chunk_idx: index,
                attempt,
            });
        }

        Ok(due.len())
    }

    /// Stop because the channel closed.
    pub fn abort(&mut self) {
        self.release();
        if self.state != SenderState::Complete {
            self.state = SenderState::Aborted;
            self.log(LogEvent::TransferAborted);
        }
    }

    fn fail(&mut self) {
        self.release();
        self.state = SenderState::Failed;
    }

    fn release(&mut self) {
        self.timers.clear();
        self.payloads.clear();
        self.requested.clear();
        self.queued.clear();
        self.unreadable.clear();
    }

    fn check_complete(&mut self) -> bool {
        if self.state == SenderState::Sending && self.base == self.total_chunks() {
            self.state = SenderState::Complete;
            self.release();
            self.log(LogEvent::TransferComplete {
                total_bytes: self.metadata.file_size,
                retransmits: self.retransmits,
            });
        }
        self.state == SenderState::Complete
    }

    fn request_read(&mut self, index: u32) {
        if self.payloads.contains_key(&index) || self.unreadable.contains(&index) {
            return;
        }
        if self.requested.insert(index) {
            self.queued.push(index);
        }
    }

    /// Put chunk `index` on the wire. Only channel errors propagate; a failed
    /// encode is logged and left to the retransmit timer.
    fn transmit(&self, outbox: &Outbox<'_>, index: u32, payload: &Bytes) -> Result<(), ChannelError> {
        let header = ChunkHeader {
            transfer_id: self.id(),
            chunk_index: index,
        };
        match outbox.send_chunk(header, payload) {
            Ok(()) => {
                self.log(LogEvent::ChunkSent {
                    chunk_idx: index,
                    len: payload.len(),
                });
                Ok(())
            }
            Err(TransferError::Channel(e)) => Err(e),
            Err(e) => {
                self.log(LogEvent::Error { message: e.to_string() });
                Ok(())
            }
        }
    }

    fn log(&self, event: LogEvent) {
        self.logger.log(TransferLog {
            component: COMPONENT,
            transfer_id: Some(self.id()),
            event,
        });
    }
}
