/// One peer's side of an open data channel.
///
/// A [`Session`] owns the channel adapter, the transfer registry and the
/// paired-mode pending header. It is driven by three inputs: channel events,
/// local commands, and the clock. [`spawn`] runs it as a tokio task that
/// selects over all three and sleeps until the next retransmit deadline.
///
/// Anything that touches the file (slicing and hashing a new source, reading
/// a chunk) runs on tokio's blocking pool and comes back to the loop as a
/// message, so a slow disk never holds up ACKs, timers, other transfers or
/// chat.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use peerdrop_types::{ControlMessage, TransferEvent, TransferId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelAdapter, ChannelEvent, Message, Outbox, WireMode};
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::logging::TransferLogger;
use crate::protocol::decode_frame;
use crate::receiver::PendingHeader;
use crate::registry::TransferRegistry;
use crate::slicer::{ChunkLoaded, ChunkRead, ChunkSource, PreparedSource};

/// Requests from the local application.
pub enum Command {
    SendFile {
        source: Arc<dyn ChunkSource>,
        file_name: String,
        mime_type: String,
        reply: oneshot::Sender<Result<TransferId, TransferError>>,
    },
    SendChat {
        text: String,
        reply: oneshot::Sender<Result<(), TransferError>>,
    },
    Close,
}

/// A source whose slicing and hashing finished on the blocking pool.
struct Prepared {
    result: Result<PreparedSource, TransferError>,
    file_name: String,
    mime_type: String,
    reply: oneshot::Sender<Result<TransferId, TransferError>>,
}

pub struct Session<C: ChannelAdapter> {
    channel: C,
    mode: WireMode,
    registry: TransferRegistry,
    pending: PendingHeader,
    events: mpsc::UnboundedSender<TransferEvent>,
    closed: bool,
}

impl<C: ChannelAdapter> Session<C> {
    /// Fails if the configuration is invalid or its wire mode cannot run
    /// over this channel.
    pub fn new(
        channel: C,
        config: TransferConfig,
        events: mpsc::UnboundedSender<TransferEvent>,
        logger: Arc<dyn TransferLogger>,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        if !config.wire_mode.supports(channel.delivery()) {
            return Err(TransferError::ModeMismatch);
        }
        let mode = config.wire_mode;
        Ok(Self {
            channel,
            mode,
            registry: TransferRegistry::new(config, events.clone(), logger),
            pending: PendingHeader::default(),
            events,
            closed: false,
        })
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.registry.next_deadline()
    }

    /// Announce a prepared source. Its chunks are requested as reads; see
    /// [`Session::take_reads`].
    pub fn send_file(
        &mut self,
        prepared: PreparedSource,
        file_name: String,
        mime_type: String,
        now: Instant,
    ) -> Result<TransferId, TransferError> {
        if self.closed {
            return Err(TransferError::SessionClosed);
        }
        let outbox = Outbox::new(&self.channel, self.mode);
        self.registry
            .start_transfer(&outbox, prepared, file_name, mime_type, now)
    }

    /// Chunk reads the transfers are waiting for.
    pub fn take_reads(&mut self) -> Vec<ChunkRead> {
        self.registry.take_reads()
    }

    /// Feed back a finished chunk read.
    pub fn on_chunk_loaded(&mut self, loaded: ChunkLoaded, now: Instant) {
        if self.closed {
            return;
        }
        let outbox = Outbox::new(&self.channel, self.mode);
        self.registry.on_chunk_loaded(&outbox, loaded, now);
    }

    pub fn send_chat(&self, text: String) -> Result<(), TransferError> {
        if self.closed {
            return Err(TransferError::SessionClosed);
        }
        Outbox::new(&self.channel, self.mode).send_control(&ControlMessage::Chat { text })
    }

    pub fn poll_timers(&mut self, now: Instant) {
        let outbox = Outbox::new(&self.channel, self.mode);
        self.registry.poll_timers(&outbox, now);
    }

    /// Feed one event from the channel.
    pub fn handle_event(&mut self, event: ChannelEvent, now: Instant) {
        if self.closed {
            return;
        }
        match event {
            ChannelEvent::Open => {
                info!(mode = %self.mode, "data channel open");
                self.emit(TransferEvent::ChannelOpened);
            }
            ChannelEvent::Close => self.close(),
            ChannelEvent::Message(Message::Text(text)) => self.handle_text(&text, now),
            ChannelEvent::Message(Message::Binary(data)) => self.handle_binary(data),
        }
    }

    /// Abort every transfer and stop accepting input.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        self.registry.close();
        info!("data channel closed");
        self.emit(TransferEvent::ChannelClosed);
    }

    fn handle_text(&mut self, text: &str, now: Instant) {
        let message = match ControlMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping undecodable text message");
                if let Some(transfer_id) = corrupt_metadata_id(text) {
                    self.emit(TransferEvent::Failed {
                        transfer_id,
                        direction: peerdrop_types::Direction::Incoming,
                        reason: format!("corrupt metadata: {}", e),
                    });
                }
                return;
            }
        };

        let outbox = Outbox::new(&self.channel, self.mode);
        match message {
            ControlMessage::Metadata(metadata) => self.registry.on_metadata(metadata),
            ControlMessage::Ack(ack) => self.registry.on_ack(&outbox, ack, now),
            ControlMessage::Chat { text } => self.emit(TransferEvent::ChatReceived { text }),
            ControlMessage::Chunk(header) => match self.mode {
                WireMode::Paired => {
                    if let Some(stale) = self.pending.set(header) {
                        warn!(
                            transfer_id = %stale.transfer_id,
                            chunk = stale.chunk_index,
                            "chunk header replaced before its payload arrived"
                        );
                    }
                }
                WireMode::Packed => {
                    warn!("dropping standalone chunk header on a packed channel");
                }
            },
        }
    }

    fn handle_binary(&mut self, data: Bytes) {
        let outbox = Outbox::new(&self.channel, self.mode);
        match self.mode {
            WireMode::Packed => match decode_frame::<ControlMessage>(data) {
                Ok((ControlMessage::Chunk(header), payload)) => {
                    self.registry.on_chunk(&outbox, header, payload);
                }
                Ok((other, _)) => {
                    debug!(?other, "dropping frame without a chunk header");
                }
                Err(e) => {
                    warn!(error = %e, "dropping malformed frame");
                }
            },
            WireMode::Paired => match self.pending.take() {
                Some(header) => self.registry.on_chunk(&outbox, header, data),
                None => {
                    warn!(len = data.len(), "dropping payload with no pending header");
                }
            },
        }
    }

    fn emit(&self, event: TransferEvent) {
        let _ = self.events.send(event);
    }
}

impl<C: ChannelAdapter + 'static> Session<C> {
    /// Drive the session until the channel closes or a `Close` command arrives.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<ChannelEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let (prepared_tx, mut prepared) = mpsc::unbounded_channel::<Prepared>();
        let (loaded_tx, mut loaded) = mpsc::unbounded_channel::<ChunkLoaded>();
        let mut commands_open = true;

        while !self.closed {
            self.dispatch_reads(&loaded_tx);

            let deadline = self.next_deadline();
            let wake = deadline
                .map(tokio::time::Instant::from_std)
                .unwrap_or_else(tokio::time::Instant::now);

            tokio::select! {
                event = inbound.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => self.close(),
                },
                command = commands.recv(), if commands_open => match command {
                    Some(Command::SendFile { source, file_name, mime_type, reply }) => {
                        let config = self.registry.config().clone();
                        let tx = prepared_tx.clone();
                        tokio::task::spawn_blocking(move || {
                            let result = PreparedSource::prepare(source, &config);
                            let _ = tx.send(Prepared { result, file_name, mime_type, reply });
                        });
                    }
                    Some(Command::SendChat { text, reply }) => {
                        let _ = reply.send(self.send_chat(text));
                    }
                    Some(Command::Close) => {
                        self.channel.close();
                        self.close();
                    }
                    // every handle dropped; keep serving the peer
                    None => commands_open = false,
                },
                Some(Prepared { result, file_name, mime_type, reply }) = prepared.recv() => {
                    let result = result
                        .and_then(|source| self.send_file(source, file_name, mime_type, Instant::now()));
                    let _ = reply.send(result);
                }
                Some(chunk) = loaded.recv() => self.on_chunk_loaded(chunk, Instant::now()),
                _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                    self.poll_timers(Instant::now());
                }
            }
        }
    }

    /// Start every pending chunk read on the blocking pool.
    fn dispatch_reads(&mut self, loaded: &mpsc::UnboundedSender<ChunkLoaded>) {
        for read in self.take_reads() {
            let tx = loaded.clone();
            tokio::task::spawn_blocking(move || {
                let _ = tx.send(read.run());
            });
        }
    }
}

/// Cloneable front end to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Start sending `source`. Resolves once the source is hashed and its
    /// metadata is on the wire; progress and completion arrive as events.
    pub async fn send_file(
        &self,
        source: Arc<dyn ChunkSource>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Result<TransferId, TransferError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SendFile {
                source,
                file_name: file_name.into(),
                mime_type: mime_type.into(),
                reply,
            })
            .map_err(|_| TransferError::SessionClosed)?;
        rx.await.map_err(|_| TransferError::SessionClosed)?
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), TransferError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SendChat {
                text: text.into(),
                reply,
            })
            .map_err(|_| TransferError::SessionClosed)?;
        rx.await.map_err(|_| TransferError::SessionClosed)?
    }

    /// Abort all transfers and stop the session.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

/// A session running on its own task.
pub struct SpawnedSession {
    pub handle: SessionHandle,
    pub events: mpsc::UnboundedReceiver<TransferEvent>,
    pub task: JoinHandle<()>,
}

/// Build a session over `channel` and run it on the current tokio runtime.
pub fn spawn<C>(
    channel: C,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    config: TransferConfig,
    logger: Arc<dyn TransferLogger>,
) -> Result<SpawnedSession, TransferError>
where
    C: ChannelAdapter + 'static,
{
    let (events_tx, events) = mpsc::unbounded_channel();
    let (commands_tx, commands) = mpsc::unbounded_channel();
    let session = Session::new(channel, config, events_tx, logger)?;
    let task = tokio::spawn(session.run(inbound, commands));
    Ok(SpawnedSession {
        handle: SessionHandle {
            commands: commands_tx,
        },
        events,
        task,
    })
}

/// Transfer id of a text message that claims to be metadata but failed to
/// decode, so the failure can be reported against it.
fn corrupt_metadata_id(text: &str) -> Option<TransferId> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("type")?.as_str()? != "metadata" {
        return None;
    }
    serde_json::from_value(value.get("fileId")?.clone()).ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use peerdrop_types::{Ack, ChunkHeader, Direction, TransferMetadata};

    use super::*;
    use crate::channel::Delivery;
    use crate::channel::memory::{LinkConfig, pair};
    use crate::logging::NullLogger;
    use crate::protocol::encode_frame;
    use crate::test_util::RecordingChannel;

    fn session(
        delivery: Delivery,
        mode: WireMode,
    ) -> (Session<RecordingChannel>, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = TransferConfig {
            chunk_size: 16,
            wire_mode: mode,
            ..Default::default()
        };
        let session =
            Session::new(RecordingChannel::new(delivery), config, tx, Arc::new(NullLogger)).unwrap();
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    fn announce(session: &mut Session<RecordingChannel>, file_size: u64) -> TransferId {
        let meta = TransferMetadata {
            transfer_id: TransferId::new(),
            file_name: "clip.ogg".into(),
            mime_type: "audio/ogg".into(),
            file_size,
            chunk_size: 16,
            total_chunks: peerdrop_types::total_chunks(file_size, 16).unwrap(),
            sha256: None,
        };
        let id = meta.transfer_id;
        let text = ControlMessage::Metadata(meta).to_json().unwrap();
        session.handle_event(ChannelEvent::Message(Message::Text(text)), Instant::now());
        id
    }

    fn text(message: &ControlMessage) -> ChannelEvent {
        ChannelEvent::Message(Message::Text(message.to_json().unwrap()))
    }

    #[test]
    fn paired_mode_requires_ordered_channel() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = TransferConfig {
            wire_mode: WireMode::Paired,
            ..Default::default()
        };
        let result = Session::new(
            RecordingChannel::new(Delivery::UnreliableUnordered),
            config,
            tx,
            Arc::new(NullLogger),
        );
        assert!(matches!(result, Err(TransferError::ModeMismatch)));
    }

    #[test]
    fn packed_frame_is_stored_and_acknowledged() {
        let (mut s, mut events) = session(Delivery::UnreliableUnordered, WireMode::Packed);
        let id = announce(&mut s, 20);

        let header = ControlMessage::Chunk(ChunkHeader {
            transfer_id: id,
            chunk_index: 1,
        });
        let frame = encode_frame(&header, &[9u8; 4]).unwrap();
        s.handle_event(ChannelEvent::Message(Message::Binary(frame)), Instant::now());

        let acks = s.channel().take_acks();
        assert_eq!(
            acks,
            vec![Ack {
                transfer_id: id,
                chunk_index: 1
            }]
        );
        assert!(drain(&mut events).contains(&TransferEvent::IncomingProgress {
            transfer_id: id,
            received: 1,
            total_chunks: 2,
        }));
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let (mut s, _events) = session(Delivery::UnreliableUnordered, WireMode::Packed);
        announce(&mut s, 20);
        s.handle_event(
            ChannelEvent::Message(Message::Binary(Bytes::from_static(&[0xff, 0xff, b'{']))),
            Instant::now(),
        );
        assert!(s.channel().take().is_empty());
    }

    #[test]
    fn paired_header_then_payload() {
        let (mut s, _events) = session(Delivery::ReliableOrdered, WireMode::Paired);
        let id = announce(&mut s, 20);
        let now = Instant::now();

        s.handle_event(
            text(&ControlMessage::Chunk(ChunkHeader {
                transfer_id: id,
                chunk_index: 0,
            })),
            now,
        );
        s.handle_event(
            ChannelEvent::Message(Message::Binary(Bytes::from(vec![1u8; 16]))),
            now,
        );
        let acks = s.channel().take_acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].chunk_index, 0);

        // payload with nothing pending
        s.handle_event(ChannelEvent::Message(Message::Binary(Bytes::from(vec![2u8; 4]))), now);
        assert!(s.channel().take().is_empty());
    }

    #[test]
    fn chat_is_forwarded_both_ways() {
        let (mut s, mut events) = session(Delivery::ReliableOrdered, WireMode::Packed);
        s.handle_event(
            text(&ControlMessage::Chat {
                text: "hello".into(),
            }),
            Instant::now(),
        );
        assert_eq!(
            drain(&mut events),
            vec![TransferEvent::ChatReceived {
                text: "hello".into()
            }]
        );

        s.send_chat("hi back".into()).unwrap();
        assert_eq!(
            s.channel().take_control(),
            vec![ControlMessage::Chat {
                text: "hi back".into()
            }]
        );
    }

    #[test]
    fn corrupt_metadata_fails_that_transfer() {
        let (mut s, mut events) = session(Delivery::ReliableOrdered, WireMode::Packed);
        let id = TransferId::new();
        let raw = format!(r#"{{"type":"metadata","fileId":"{}","fileName":7}}"#, id);
        s.handle_event(ChannelEvent::Message(Message::Text(raw)), Instant::now());

        assert!(matches!(
            drain(&mut events).as_slice(),
            [TransferEvent::Failed { transfer_id, direction: Direction::Incoming, .. }] if *transfer_id == id
        ));
    }

    #[test]
    fn chunks_go_out_as_reads_come_back() {
        let (mut s, _events) = session(Delivery::ReliableOrdered, WireMode::Packed);
        let now = Instant::now();
        let data = Bytes::from(vec![4u8; 40]);
        let config = TransferConfig {
            chunk_size: 16,
            ..Default::default()
        };
        let prepared = PreparedSource::prepare(Arc::new(data), &config).unwrap();
        s.send_file(prepared, "f".into(), "x/y".into(), now).unwrap();

        assert_eq!(s.channel().take().len(), 1, "only the metadata before any read");
        let reads = s.take_reads();
        assert_eq!(reads.len(), 3);
        for read in reads {
            s.on_chunk_loaded(read.run(), now);
        }
        let sent: Vec<u32> = s
            .channel()
            .take_chunks()
            .iter()
            .map(|(h, _)| h.chunk_index)
            .collect();
        assert_eq!(sent, vec![0, 1, 2]);
    }

    #[test]
    fn close_rejects_further_work() {
        let (mut s, mut events) = session(Delivery::ReliableOrdered, WireMode::Packed);
        s.handle_event(ChannelEvent::Close, Instant::now());
        assert!(s.is_closed());
        assert_eq!(drain(&mut events), vec![TransferEvent::ChannelClosed]);

        let prepared =
            PreparedSource::prepare(Arc::new(Bytes::from_static(b"x")), &TransferConfig::default()).unwrap();
        let result = s.send_file(prepared, "x".into(), "x/y".into(), Instant::now());
        assert!(matches!(result, Err(TransferError::SessionClosed)));
    }

    /// Sleeps on every read, like a slow disk.
    struct SlowSource {
        data: Bytes,
        delay: Duration,
    }

    impl ChunkSource for SlowSource {
        fn len(&self) -> u64 {
            self.data.len() as u64
        }

        fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Bytes> {
            std::thread::sleep(self.delay);
            self.data.read_at(offset, len)
        }
    }

    #[tokio::test]
    async fn slow_source_does_not_stall_other_work() {
        let (a, b) = pair(LinkConfig::default());
        let config = TransferConfig {
            chunk_size: 64,
            ..Default::default()
        };
        let alice = spawn(a.channel, a.events, config.clone(), Arc::new(NullLogger)).unwrap();
        let mut bob = spawn(b.channel, b.events, config, Arc::new(NullLogger)).unwrap();

        // hashing alone takes 100 reads of 20 ms
        let slow = Bytes::from(vec![3u8; 64 * 100]);
        let source = Arc::new(SlowSource {
            data: slow.clone(),
            delay: Duration::from_millis(20),
        });
        let handle = alice.handle.clone();
        let slow_send = tokio::spawn(async move { handle.send_file(source, "slow.bin", "x/y").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let quick = Bytes::from(vec![9u8; 1000]);
        let quick_id = alice
            .handle
            .send_file(Arc::new(quick.clone()), "quick.bin", "x/y")
            .await
            .unwrap();
        alice.handle.send_chat("still here").await.unwrap();

        let meanwhile = async {
            let (mut chat, mut delivered) = (false, false);
            while !(chat && delivered) {
                match bob.events.recv().await {
                    Some(TransferEvent::ChatReceived { text }) => {
                        assert_eq!(text, "still here");
                        chat = true;
                    }
                    Some(TransferEvent::IncomingComplete { transfer_id, bytes, .. }) if transfer_id == quick_id => {
                        assert_eq!(bytes, quick);
                        delivered = true;
                    }
                    Some(TransferEvent::Failed { reason, .. }) => panic!("transfer failed: {}", reason),
                    Some(_) => {}
                    None => panic!("session ended"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(1), meanwhile)
            .await
            .expect("session stalled behind a slow source");

        let slow_id = slow_send.await.unwrap().unwrap();
        let arrived = async {
            loop {
                match bob.events.recv().await {
                    Some(TransferEvent::IncomingComplete { transfer_id, bytes, .. }) if transfer_id == slow_id => {
                        return bytes;
                    }
                    Some(TransferEvent::Failed { reason, .. }) => panic!("transfer failed: {}", reason),
                    Some(_) => {}
                    None => panic!("session ended"),
                }
            }
        };
        let bytes = tokio::time::timeout(Duration::from_secs(10), arrived)
            .await
            .expect("slow transfer timed out");
        assert_eq!(bytes, slow);
    }

    async fn wait_for_incoming(rx: &mut mpsc::UnboundedReceiver<TransferEvent>) -> (String, Bytes) {
        loop {
            match rx.recv().await {
                Some(TransferEvent::IncomingComplete { file_name, bytes, .. }) => return (file_name, bytes),
                Some(TransferEvent::Failed { reason, .. }) => panic!("transfer failed: {}", reason),
                Some(_) => continue,
                None => panic!("session ended"),
            }
        }
    }

    async fn transfer_over(link: LinkConfig, mode: WireMode) {
        let (a, b) = pair(link);
        let config = TransferConfig {
            chunk_size: 64,
            retransmit_timeout: Duration::from_millis(20),
            wire_mode: mode,
            ..Default::default()
        };
        let alice = spawn(a.channel, a.events, config.clone(), Arc::new(NullLogger)).unwrap();
        let mut bob = spawn(b.channel, b.events, config, Arc::new(NullLogger)).unwrap();

        let data: Bytes = (0..5000u32).map(|i| (i * 31 % 256) as u8).collect::<Vec<u8>>().into();
        alice
            .handle
            .send_file(Arc::new(data.clone()), "blob.bin", "application/octet-stream")
            .await
            .unwrap();

        let (name, bytes) = tokio::time::timeout(Duration::from_secs(10), wait_for_incoming(&mut bob.events))
            .await
            .expect("transfer timed out");
        assert_eq!(name, "blob.bin");
        assert_eq!(bytes, data);

        alice.handle.close();
        alice.task.await.unwrap();
    }

    #[tokio::test]
    async fn packed_session_over_reliable_link() {
        transfer_over(LinkConfig::default(), WireMode::Packed).await;
    }

    #[tokio::test]
    async fn paired_session_over_reliable_link() {
        transfer_over(LinkConfig::default(), WireMode::Paired).await;
    }

    #[tokio::test]
    async fn packed_session_over_lossy_link() {
        transfer_over(LinkConfig::lossy(0.2, 0.2), WireMode::Packed).await;
    }

    #[tokio::test]
    async fn chat_reaches_peer() {
        let (a, b) = pair(LinkConfig::default());
        let alice = spawn(a.channel, a.events, TransferConfig::default(), Arc::new(NullLogger)).unwrap();
        let mut bob = spawn(b.channel, b.events, TransferConfig::default(), Arc::new(NullLogger)).unwrap();

        alice.handle.send_chat("ping").await.unwrap();
        loop {
            match bob.events.recv().await {
                Some(TransferEvent::ChatReceived { text }) => {
                    assert_eq!(text, "ping");
                    break;
                }
                Some(_) => continue,
                None => panic!("session ended"),
            }
        }
    }

    #[tokio::test]
    async fn closing_one_side_aborts_the_other() {
        let (a, b) = pair(LinkConfig::lossy(1.0, 0.0));
        let config = TransferConfig {
            retransmit_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let alice = spawn(a.channel, a.events, config.clone(), Arc::new(NullLogger)).unwrap();
        let mut bob = spawn(b.channel, b.events, config, Arc::new(NullLogger)).unwrap();

        let data = Bytes::from(vec![5u8; 100_000]);
        let id = alice.handle.send_file(Arc::new(data), "big", "x/y").await.unwrap();

        // metadata is text and survives the lossy link
        loop {
            if let Some(TransferEvent::IncomingStarted { transfer_id, .. }) = bob.events.recv().await {
                assert_eq!(transfer_id, id);
                break;
            }
        }
        bob.handle.close();
        bob.task.await.unwrap();
        assert!(drain(&mut bob.events).contains(&TransferEvent::Aborted {
            transfer_id: id,
            direction: Direction::Incoming,
        }));
    }
}
