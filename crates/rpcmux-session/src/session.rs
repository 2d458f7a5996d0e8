use std::collections::HashMap;
#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use rpcmux_frame::{
    Command, FrameConfig, Message, MessageKind, MessageReader, MessageWriter,
};
use rpcmux_transport::{RpcStream, TcpEndpoint};
#[cfg(unix)]
use rpcmux_transport::UnixDomainSocket;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{Result, SessionError};
use crate::registry::{Handler, HandlerRegistry};
use crate::stream::{stream_pair, StreamChannel, StreamFault, StreamSlot};

/// Per-direction backpressure bound for stream channels.
pub const DEFAULT_STREAM_QUEUE_DEPTH: usize = 10;

/// Default capacity of the writer thread's inbox.
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 64;

/// Session behavior configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of a stream channel's inbound and outbound queues.
    pub stream_queue_depth: usize,
    /// Capacity of the queue feeding the connection's single writer.
    pub write_queue_depth: usize,
    /// Frame limits and socket timeouts.
    ///
    /// The read timeout is not applied to the session's read loop — it
    /// blocks indefinitely between frames, and liveness is established by
    /// [`Session::ping`] instead.
    pub frame: FrameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_queue_depth: DEFAULT_STREAM_QUEUE_DEPTH,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
            frame: FrameConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Override the per-direction stream queue capacity.
    pub fn with_stream_queue_depth(mut self, depth: usize) -> Self {
        self.stream_queue_depth = depth;
        self
    }

    /// Override the writer inbox capacity.
    pub fn with_write_queue_depth(mut self, depth: usize) -> Self {
        self.write_queue_depth = depth;
        self
    }

    /// Override frame limits and socket timeouts.
    pub fn with_frame(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

/// A call waiting for frames carrying its sequence number.
enum Pending {
    /// Unary call or ping: resolved by one Response/Error frame.
    Unary(SyncSender<Message>),
    /// Streaming call: fed by StreamData frames until StreamClose.
    Stream(StreamSlot),
}

/// State shared by the session handle, its read loop and its write loop.
struct SessionShared {
    /// sequence → pending slot. Inserted by call initiators, removed by
    /// the read loop and by timeout handling — always under this lock, so
    /// a timed-out slot and a late reply cannot race.
    pending: Mutex<HashMap<u32, Pending>>,
    closed: AtomicBool,
    /// Extra clone of the connection, used only to shut it down.
    stream: RpcStream,
}

impl SessionShared {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u32, Pending>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert_pending(&self, seq: u32, pending: Pending) {
        if self.lock_pending().insert(seq, pending).is_some() {
            // Sequence reuse while a call is still in flight breaks
            // correlation; the old call is abandoned.
            warn!(seq, "replaced in-flight pending call");
        }
    }

    fn remove_pending(&self, seq: u32) -> Option<Pending> {
        self.lock_pending().remove(&seq)
    }

    fn stream_sender(&self, seq: u32) -> Option<SyncSender<Message>> {
        match self.lock_pending().get(&seq) {
            Some(Pending::Stream(slot)) => Some(slot.sender()),
            _ => None,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tear the connection down once: shut the socket, fail every
    /// outstanding call and stream with the transport-closed condition.
    fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stream.shutdown();

        let drained: Vec<Pending> = {
            let mut pending = self.lock_pending();
            pending.drain().map(|(_, p)| p).collect()
        };
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing outstanding calls on teardown");
        }
        for entry in drained {
            match entry {
                // Dropping the sender resolves the caller's receive with
                // a disconnect, surfaced as TransportClosed.
                Pending::Unary(tx) => drop(tx),
                Pending::Stream(slot) => slot.fail(StreamFault::TransportClosed),
            }
        }
    }
}

/// One multiplexed RPC connection.
///
/// Owns the underlying byte stream through two worker threads: a read loop
/// that routes inbound frames to pending calls, stream channels or the
/// handler registry, and a write loop that is the sole writer to the
/// socket. Both client and server sides of a connection are `Session`s;
/// the difference is only whether the registry has handlers.
///
/// Dropping a session closes the connection.
pub struct Session {
    shared: Arc<SessionShared>,
    writer_tx: SyncSender<Message>,
    next_seq: AtomicU32,
    config: SessionConfig,
}

impl Session {
    /// Wrap a connected stream with the default configuration.
    pub fn new(stream: RpcStream, registry: Arc<HandlerRegistry>) -> Result<Self> {
        Self::with_config(stream, registry, SessionConfig::default())
    }

    /// Wrap a connected stream with explicit configuration.
    pub fn with_config(
        stream: RpcStream,
        registry: Arc<HandlerRegistry>,
        config: SessionConfig,
    ) -> Result<Self> {
        let read_half = stream.try_clone()?;
        let shutdown_handle = stream.try_clone()?;

        let reader_config = FrameConfig {
            read_timeout: None,
            ..config.frame.clone()
        };
        let reader = MessageReader::with_config_stream(read_half, reader_config)?;
        let writer = MessageWriter::with_config_stream(stream, config.frame.clone())?;

        let (writer_tx, writer_rx) = mpsc::sync_channel(config.write_queue_depth);
        let shared = Arc::new(SessionShared {
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            stream: shutdown_handle,
        });

        {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("rpcmux-write".into())
                .spawn(move || write_loop(writer, writer_rx, shared))
                .map_err(SessionError::Spawn)?;
        }
        {
            let shared = Arc::clone(&shared);
            let writer_tx = writer_tx.clone();
            let stream_depth = config.stream_queue_depth;
            std::thread::Builder::new()
                .name("rpcmux-read".into())
                .spawn(move || read_loop(reader, shared, registry, writer_tx, stream_depth))
                .map_err(SessionError::Spawn)?;
        }

        Ok(Self {
            shared,
            writer_tx,
            next_seq: AtomicU32::new(0),
            config,
        })
    }

    /// Connect to a Unix domain socket as a pure client (no handlers).
    #[cfg(unix)]
    pub fn connect_uds(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixDomainSocket::connect(path)?;
        Self::new(stream, Arc::new(HandlerRegistry::new()))
    }

    /// Connect to a TCP endpoint as a pure client (no handlers).
    pub fn connect_tcp(addr: &str) -> Result<Self> {
        let stream = TcpEndpoint::connect(addr)?;
        Self::new(stream, Arc::new(HandlerRegistry::new()))
    }

    fn next_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Issue a unary call and block for its reply.
    ///
    /// Fails with [`SessionError::RwTimeout`] if no matching Response or
    /// Error frame arrives within `timeout`; a reply arriving later is
    /// dropped by the read loop. Encoding failures (including the
    /// unsupported codec) fail the call before any byte is written.
    pub fn call<P, R>(&self, cmd: &str, param: &P, timeout: Duration) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let mut msg = Message::request(Command::new(cmd)?, self.next_seq());
        msg.encode_value(param)?;
        let reply = self.round_trip(msg, timeout)?
            .ok_or(SessionError::RwTimeout(timeout))?;
        unary_reply(reply)
    }

    /// Open a streaming call.
    ///
    /// The channel is returned immediately; the read loop feeds inbound
    /// `StreamData` frames with this call's sequence into it until the
    /// peer closes the stream or the connection dies.
    pub fn call_stream<P: Serialize>(&self, cmd: &str, param: &P) -> Result<StreamChannel> {
        let mut msg = Message::request(Command::new(cmd)?, self.next_seq());
        msg.encode_value(param)?;
        let seq = msg.seq;

        let (slot, channel) = stream_pair(
            msg.without_payload(),
            self.config.stream_queue_depth,
            self.writer_tx.clone(),
        )?;
        self.shared.insert_pending(seq, Pending::Stream(slot));

        if self.writer_tx.send(msg).is_err() {
            self.shared.remove_pending(seq);
            return Err(SessionError::TransportClosed);
        }
        Ok(channel)
    }

    /// Probe connection liveness.
    ///
    /// Sends a Ping frame; the peer answers with an empty Response
    /// carrying the same sequence. Fails with
    /// [`SessionError::PingTimeout`] on expiry.
    pub fn ping(&self, timeout: Duration) -> Result<()> {
        let msg = Message::control(MessageKind::Ping, self.next_seq());
        match self.round_trip(msg, timeout)? {
            Some(_) => Ok(()),
            None => Err(SessionError::PingTimeout(timeout)),
        }
    }

    /// Send a request-shaped frame and wait for the frame that resolves
    /// it. `Ok(None)` means the timeout elapsed and the slot was removed.
    fn round_trip(&self, msg: Message, timeout: Duration) -> Result<Option<Message>> {
        let seq = msg.seq;
        let (tx, rx) = mpsc::sync_channel(1);
        self.shared.insert_pending(seq, Pending::Unary(tx));

        if self.writer_tx.send(msg).is_err() {
            self.shared.remove_pending(seq);
            return Err(SessionError::TransportClosed);
        }

        match rx.recv_timeout(timeout) {
            Ok(reply) => Ok(Some(reply)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Remove the slot first — under the same lock the read
                // loop routes with — so a late reply finds no slot and is
                // dropped. A reply that won the race is already queued.
                self.shared.remove_pending(seq);
                Ok(rx.try_recv().ok())
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SessionError::TransportClosed),
        }
    }

    /// Send a Close frame to the peer and tear the connection down.
    pub fn close(&self) {
        let close = Message::control(MessageKind::Close, self.next_seq());
        // The write loop tears down after putting Close on the wire; if
        // its inbox is unreachable or full, tear down directly.
        if self.writer_tx.try_send(close).is_err() {
            self.shared.teardown();
        }
    }

    /// True once the connection has been torn down.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn unary_reply<R: DeserializeOwned>(reply: Message) -> Result<R> {
    match reply.kind {
        MessageKind::Response => Ok(reply.decode_value()?),
        MessageKind::Error => Err(SessionError::Remote(
            String::from_utf8_lossy(&reply.payload).into_owned(),
        )),
        _ => Err(SessionError::TransportClosed),
    }
}

/// Sole writer to the connection. Every outbound frame — requests,
/// responses, stream chunks, pings, closes — funnels through here, so
/// frames are never interleaved.
fn write_loop(
    mut writer: MessageWriter<RpcStream>,
    writer_rx: Receiver<Message>,
    shared: Arc<SessionShared>,
) {
    while let Ok(msg) = writer_rx.recv() {
        let closing = msg.kind == MessageKind::Close;
        if let Err(err) = writer.write_message(&msg) {
            if !shared.is_closed() {
                warn!(error = %err, "connection write failed");
            }
            break;
        }
        if closing {
            // Close goes on the wire before the socket is shut down.
            break;
        }
    }
    shared.teardown();
}

/// Reads one frame at a time for the connection's lifetime and routes it:
/// replies to pending calls, chunks to stream channels, requests to the
/// handler registry. Exits — tearing the connection down — on a Close
/// frame, EOF or any framing error.
fn read_loop(
    mut reader: MessageReader<RpcStream>,
    shared: Arc<SessionShared>,
    registry: Arc<HandlerRegistry>,
    writer_tx: SyncSender<Message>,
    stream_depth: usize,
) {
    loop {
        let msg = match reader.read_message() {
            Ok(msg) => msg,
            Err(err) => {
                if !shared.is_closed() {
                    debug!(error = %err, "connection read ended");
                }
                break;
            }
        };

        match msg.kind {
            MessageKind::Response | MessageKind::Error => {
                match shared.remove_pending(msg.seq) {
                    Some(Pending::Unary(tx)) => {
                        let _ = tx.send(msg);
                    }
                    Some(Pending::Stream(slot)) => {
                        warn!(seq = msg.seq, "stream terminated by error frame");
                        slot.fail(StreamFault::Stopped);
                    }
                    // Already timed out or never existed.
                    None => debug!(seq = msg.seq, "dropping reply with no pending call"),
                }
            }
            MessageKind::StreamData => match shared.stream_sender(msg.seq) {
                // Blocking send: a full inbound queue is backpressure
                // against a consumer that is slower than the wire.
                Some(tx) => {
                    let _ = tx.send(msg);
                }
                None => debug!(seq = msg.seq, "dropping chunk with no open stream"),
            },
            MessageKind::StreamClose => {
                if let Some(Pending::Stream(slot)) = shared.remove_pending(msg.seq) {
                    slot.finish();
                }
            }
            MessageKind::Ping => {
                let mut reply = msg.without_payload();
                reply.kind = MessageKind::Response;
                let _ = writer_tx.send(reply);
            }
            MessageKind::Close => break,
            MessageKind::Request => dispatch(&registry, msg, &writer_tx, &shared, stream_depth),
        }
    }
    shared.teardown();
}

/// Route one inbound request through the registry.
///
/// Runs on the read loop thread only long enough to look the command up
/// and, for streaming commands, register the stream slot before any chunk
/// for the same call can arrive. The handler itself runs on a spawned
/// thread, so a slow handler never stalls delivery of unrelated frames.
fn dispatch(
    registry: &HandlerRegistry,
    msg: Message,
    writer_tx: &SyncSender<Message>,
    shared: &Arc<SessionShared>,
    stream_depth: usize,
) {
    let cmd = msg.cmd.as_str().to_string();
    match registry.lookup(&cmd) {
        None => {
            debug!(cmd, seq = msg.seq, "command not found");
            send_error(writer_tx, &msg, &SessionError::CommandNotFound(cmd));
        }
        Some(Handler::Unary(handler)) => {
            let writer_tx = writer_tx.clone();
            let spawned = std::thread::Builder::new()
                .name("rpcmux-dispatch".into())
                .spawn(move || run_unary(&handler, &msg, &writer_tx, &cmd));
            if let Err(err) = spawned {
                error!(error = %err, "failed to spawn dispatch thread");
            }
        }
        Some(Handler::Stream(handler)) => {
            let pair = stream_pair(msg.without_payload(), stream_depth, writer_tx.clone());
            let (slot, channel) = match pair {
                Ok(pair) => pair,
                Err(err) => {
                    send_error(writer_tx, &msg, &err);
                    return;
                }
            };
            // Registered before the read loop resumes, so chunks the
            // caller sent right behind the request find their channel.
            shared.insert_pending(msg.seq, Pending::Stream(slot));

            let writer_tx = writer_tx.clone();
            let seq = msg.seq;
            let shared_clone = Arc::clone(shared);
            let spawned = std::thread::Builder::new()
                .name("rpcmux-dispatch".into())
                .spawn(move || {
                    let result = handler(&msg, &channel);
                    shared_clone.remove_pending(msg.seq);
                    if let Err(err) = result {
                        warn!(cmd, seq = msg.seq, error = %err, "stream handler failed");
                        send_error(&writer_tx, &msg, &err);
                    }
                });
            if let Err(err) = spawned {
                shared.remove_pending(seq);
                error!(error = %err, "failed to spawn dispatch thread");
            }
        }
    }
}

fn run_unary(
    handler: &crate::registry::UnaryHandler,
    msg: &Message,
    writer_tx: &SyncSender<Message>,
    cmd: &str,
) {
    match handler(msg) {
        Ok(value) => {
            let mut reply = msg.without_payload();
            reply.kind = MessageKind::Response;
            match reply.encode_value(&value) {
                Ok(()) => {
                    let _ = writer_tx.send(reply);
                }
                Err(err) => send_error(writer_tx, msg, &err.into()),
            }
        }
        Err(err) => {
            debug!(cmd, seq = msg.seq, error = %err, "handler failed");
            send_error(writer_tx, msg, &err);
        }
    }
}

fn send_error(writer_tx: &SyncSender<Message>, request: &Message, err: &SessionError) {
    let mut reply = request.without_payload();
    reply.kind = MessageKind::Error;
    reply.payload = Bytes::from(err.to_string().into_bytes());
    let _ = writer_tx.send(reply);
}
