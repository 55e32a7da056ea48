/// Per-session table of active transfers.
///
/// Outbound and inbound transfers are keyed by [`TransferId`] in separate
/// maps, so a peer can send and receive several files at once over one
/// channel. Messages for ids the registry does not know are dropped.
/// Finished transfers are removed and announced on the event channel; the
/// most recent delivered ones are remembered so late retransmits still get
/// an ACK.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use peerdrop_types::{
    Ack, ChunkHeader, ControlMessage, Direction, TransferEvent, TransferId, TransferMetadata,
};
use tokio::sync::mpsc;

use crate::channel::Outbox;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::logging::{LogEvent, TransferLog, TransferLogger};
use crate::receiver::{ChunkOutcome, InboundTransfer};
use crate::sender::{AckOutcome, OutboundTransfer};
use crate::slicer::{ChunkLoaded, ChunkRead, PreparedSource};

const COMPONENT: &str = "registry";

/// Delivered inbound transfers remembered for re-acknowledgement.
pub const FINISHED_CAPACITY: usize = 64;

pub struct TransferRegistry {
    config: TransferConfig,
    outbound: HashMap<TransferId, OutboundTransfer>,
    inbound: HashMap<TransferId, InboundTransfer>,
    /// Delivered inbound transfers and their chunk counts, so late
    /// retransmits are still acknowledged. Oldest first, at most
    /// `FINISHED_CAPACITY` entries.
    finished: VecDeque<(TransferId, u32)>,
    events: mpsc::UnboundedSender<TransferEvent>,
    logger: Arc<dyn TransferLogger>,
}

impl TransferRegistry {
    pub fn new(
        config: TransferConfig,
        events: mpsc::UnboundedSender<TransferEvent>,
        logger: Arc<dyn TransferLogger>,
    ) -> Self {
        Self {
            config,
            outbound: HashMap::new(),
            inbound: HashMap::new(),
            finished: VecDeque::new(),
            events,
            logger,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn outbound(&self, id: &TransferId) -> Option<&OutboundTransfer> {
        self.outbound.get(id)
    }

    pub fn inbound(&self, id: &TransferId) -> Option<&InboundTransfer> {
        self.inbound.get(id)
    }

    pub fn outbound_count(&self) -> usize {
        self.outbound.len()
    }

    pub fn is_idle(&self) -> bool {
        self.outbound.is_empty() && self.inbound.is_empty()
    }

    /// Publish the metadata of a prepared source and request its first
    /// window.
    pub fn start_transfer(
        &mut self,
        outbox: &Outbox<'_>,
        prepared: PreparedSource,
        file_name: String,
        mime_type: String,
        now: Instant,
    ) -> Result<TransferId, TransferError> {
        let PreparedSource { slicer, sha256 } = prepared;
        let metadata = TransferMetadata {
            transfer_id: TransferId::new(),
            file_name,
            mime_type,
            file_size: slicer.file_size(),
            chunk_size: slicer.chunk_size(),
            total_chunks: slicer.total_chunks(),
            sha256,
        };
        let id = metadata.transfer_id;
        let file_name = metadata.file_name.clone();

        let mut transfer = OutboundTransfer::new(metadata, slicer, &self.config, self.logger.clone());
        transfer.start(outbox, now)?;

        self.emit(TransferEvent::OutgoingStarted {
            transfer_id: id,
            file_name,
            total_chunks: transfer.total_chunks(),
        });
        if transfer.is_complete() {
            self.emit(TransferEvent::OutgoingComplete {
                transfer_id: id,
                retransmits: 0,
            });
        } else {
            self.outbound.insert(id, transfer);
        }
        Ok(id)
    }

    /// Begin receiving a transfer announced by the peer.
    pub fn on_metadata(&mut self, metadata: TransferMetadata) {
        let id = metadata.transfer_id;
        if self.inbound.contains_key(&id) {
            self.drop_message(Some(id), "metadata for a transfer already in progress");
            return;
        }

        let transfer = match InboundTransfer::new(metadata, &self.config, self.logger.clone()) {
            Ok(transfer) => transfer,
            Err(e) => {
                self.log(Some(id), LogEvent::Error { message: e.to_string() });
                self.emit(TransferEvent::Failed {
                    transfer_id: id,
                    direction: Direction::Incoming,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let meta = transfer.metadata();
        self.emit(TransferEvent::IncomingStarted {
            transfer_id: id,
            file_name: meta.file_name.clone(),
            mime_type: meta.mime_type.clone(),
            file_size: meta.file_size,
            total_chunks: meta.total_chunks,
        });

        if transfer.is_complete() {
            self.finish_inbound(transfer);
        } else {
            self.inbound.insert(id, transfer);
        }
    }

    /// Store a chunk and acknowledge it. Duplicates are acknowledged again
    /// so a sender whose ACK was lost can make progress.
    pub fn on_chunk(&mut self, outbox: &Outbox<'_>, header: ChunkHeader, payload: Bytes) {
        let id = header.transfer_id;
        let Some(transfer) = self.inbound.get_mut(&id) else {
            let finished = self.finished.iter().find(|(done, _)| *done == id);
            if finished.is_some_and(|&(_, total)| header.chunk_index < total) {
                self.log(Some(id), LogEvent::DuplicateChunk { chunk_idx: header.chunk_index });
                if let Err(e) = outbox.send_control(&ack_for(header)) {
                    self.log(Some(id), LogEvent::Error { message: e.to_string() });
                }
            } else {
                self.drop_message(Some(id), "chunk for unknown transfer");
            }
            return;
        };

        let outcome = match transfer.on_chunk(header.chunk_index, payload) {
            Ok(outcome) => outcome,
            Err(e) => {
                // no ACK, so the sender retransmits
                self.drop_message(Some(id), &e.to_string());
                return;
            }
        };
        let received = transfer.received();
        let total_chunks = transfer.total_chunks();
        let complete = transfer.is_complete();

        if let Err(e) = outbox.send_control(&ack_for(header)) {
            if let TransferError::Channel(_) = e {
                self.inbound.remove(&id);
                self.fail(id, Direction::Incoming, &e);
                return;
            }
            self.log(Some(id), LogEvent::Error { message: e.to_string() });
        }

        if let ChunkOutcome::Stored { .. } = outcome {
            self.emit(TransferEvent::IncomingProgress {
                transfer_id: id,
                received,
                total_chunks,
            });
        }

        if complete {
            if let Some(transfer) = self.inbound.remove(&id) {
                self.finish_inbound(transfer);
            }
        }
    }

    /// Apply an ACK from the peer to the matching outbound transfer.
    pub fn on_ack(&mut self, outbox: &Outbox<'_>, ack: Ack, now: Instant) {
        let id = ack.transfer_id;
        let Some(transfer) = self.outbound.get_mut(&id) else {
            self.drop_message(Some(id), "ack for unknown transfer");
            return;
        };
        let total_chunks = transfer.total_chunks();

        match transfer.on_ack(ack.chunk_index, outbox, now) {
            Ok(AckOutcome::Ignored) => {}
            Ok(AckOutcome::Accepted { acked }) => {
                self.emit(TransferEvent::OutgoingProgress {
                    transfer_id: id,
                    acked,
                    total_chunks,
                });
            }
            Ok(AckOutcome::Complete) => {
                let retransmits = transfer.retransmits();
                self.outbound.remove(&id);
                self.emit(TransferEvent::OutgoingProgress {
                    transfer_id: id,
                    acked: total_chunks,
                    total_chunks,
                });
                self.emit(TransferEvent::OutgoingComplete {
                    transfer_id: id,
                    retransmits,
                });
            }
            Err(e) => {
                self.outbound.remove(&id);
                self.fail(id, Direction::Outgoing, &TransferError::Channel(e));
            }
        }
    }

    /// Reads requested by outbound transfers since the last call.
    pub fn take_reads(&mut self) -> Vec<ChunkRead> {
        self.outbound
            .values_mut()
            .flat_map(|transfer| transfer.take_reads())
            .collect()
    }

    /// Hand a finished read back to its transfer. Reads for transfers that
    /// ended meanwhile are dropped.
    pub fn on_chunk_loaded(&mut self, outbox: &Outbox<'_>, loaded: ChunkLoaded, now: Instant) {
        let id = loaded.transfer_id;
        let Some(transfer) = self.outbound.get_mut(&id) else {
            return;
        };
        if let Err(e) = transfer.on_chunk_loaded(loaded.index, loaded.result, outbox, now) {
            self.outbound.remove(&id);
            self.fail(id, Direction::Outgoing, &TransferError::Channel(e));
        }
    }

    /// Fire every retransmit timer due at `now`.
    pub fn poll_timers(&mut self, outbox: &Outbox<'_>, now: Instant) {
        let due: Vec<TransferId> = self
            .outbound
            .iter()
            .filter(|(_, t)| t.next_deadline().is_some_and(|d| d <= now))
            .map(|(&id, _)| id)
            .collect();

        for id in due {
            let Some(transfer) = self.outbound.get_mut(&id) else {
                continue;
            };
            if let Err(e) = transfer.poll_timers(outbox, now) {
                self.outbound.remove(&id);
                self.fail(id, Direction::Outgoing, &e);
            }
        }
    }

    /// Earliest retransmit deadline across all outbound transfers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.outbound.values().filter_map(|t| t.next_deadline()).min()
    }

    /// Tear down every transfer because the channel closed. Pending timers
    /// are dropped with their transfers.
    pub fn close(&mut self) {
        self.finished.clear();
        for (id, mut transfer) in self.outbound.drain() {
            transfer.abort();
            let _ = self.events.send(TransferEvent::Aborted {
                transfer_id: id,
                direction: Direction::Outgoing,
            });
        }
        for (id, _) in self.inbound.drain() {
            self.logger.log(TransferLog {
                component: COMPONENT,
                transfer_id: Some(id),
                event: LogEvent::TransferAborted,
            });
            let _ = self.events.send(TransferEvent::Aborted {
                transfer_id: id,
                direction: Direction::Incoming,
            });
        }
    }

    fn finish_inbound(&mut self, transfer: InboundTransfer) {
        let id = transfer.id();
        let file_name = transfer.metadata().file_name.clone();
        let mime_type = transfer.metadata().mime_type.clone();
        let total_chunks = transfer.total_chunks();
        match transfer.assemble() {
            Ok(bytes) => {
                if self.finished.len() == FINISHED_CAPACITY {
                    self.finished.pop_front();
                }
                self.finished.push_back((id, total_chunks));
                self.emit(TransferEvent::IncomingComplete {
                    transfer_id: id,
                    file_name,
                    mime_type,
                    bytes,
                });
            }
            Err(e) => self.fail(id, Direction::Incoming, &e),
        }
    }

    fn fail(&self, id: TransferId, direction: Direction, error: &TransferError) {
        self.log(Some(id), LogEvent::Error { message: error.to_string() });
        self.emit(TransferEvent::Failed {
            transfer_id: id,
            direction,
            reason: error.to_string(),
        });
    }

    fn drop_message(&self, id: Option<TransferId>, reason: &str) {
        self.log(id, LogEvent::Dropped { reason: reason.to_string() });
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }

    fn log(&self, transfer_id: Option<TransferId>, event: LogEvent) {
        self.logger.log(TransferLog {
            component: COMPONENT,
            transfer_id,
            event,
        });
    }
}

fn ack_for(header: ChunkHeader) -> ControlMessage {
    ControlMessage::Ack(Ack {
        transfer_id: header.transfer_id,
        chunk_index: header.chunk_index,
    })
}
