use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};

use rpcmux_frame::{Message, MessageKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, SessionError};

/// Terminal condition of a stream, sticky once set.
///
/// Kept separate from [`SessionError`] so it can be stored and re-reported
/// on every receive after the stream dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamFault {
    /// The stream ended (peer closed it or an error frame arrived).
    Stopped,
    /// The whole connection was torn down.
    TransportClosed,
}

impl From<StreamFault> for SessionError {
    fn from(fault: StreamFault) -> Self {
        match fault {
            StreamFault::Stopped => SessionError::StreamStopped,
            StreamFault::TransportClosed => SessionError::TransportClosed,
        }
    }
}

#[derive(Default)]
struct StreamState {
    fault: Option<StreamFault>,
    done: bool,
}

/// State shared between a [`StreamChannel`] and its session-side slot:
/// the sticky fault and the one-shot completion signal.
pub(crate) struct StreamShared {
    state: Mutex<StreamState>,
    completed: Condvar,
}

impl StreamShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StreamState::default()),
            completed: Condvar::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn fault(&self) -> Option<StreamFault> {
        self.lock().fault
    }

    /// Set the sticky fault (first writer wins) and signal completion.
    pub(crate) fn set_fault(&self, fault: StreamFault) {
        let mut state = self.lock();
        if state.fault.is_none() {
            state.fault = Some(fault);
        }
        state.done = true;
        self.completed.notify_all();
    }

    /// Signal clean completion without a fault.
    pub(crate) fn finish(&self) {
        let mut state = self.lock();
        state.done = true;
        self.completed.notify_all();
    }

    pub(crate) fn is_done(&self) -> bool {
        self.lock().done
    }

    pub(crate) fn wait_done(&self) {
        let mut state = self.lock();
        while !state.done {
            state = self
                .completed
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Session-side handle to a stream: where the read loop delivers inbound
/// chunks, and where teardown sets the sticky fault.
pub(crate) struct StreamSlot {
    inbound_tx: SyncSender<Message>,
    shared: Arc<StreamShared>,
}

impl StreamSlot {
    /// Clone of the inbound sender, so the read loop can deliver without
    /// holding the pending-table lock across a blocking send.
    pub(crate) fn sender(&self) -> SyncSender<Message> {
        self.inbound_tx.clone()
    }

    /// Terminate with a sticky fault. Dropping the slot afterwards closes
    /// the inbound queue.
    pub(crate) fn fail(&self, fault: StreamFault) {
        self.shared.set_fault(fault);
    }

    /// Clean end-of-stream: completion is signalled and the inbound queue
    /// closes when the slot drops, letting queued chunks drain first.
    pub(crate) fn finish(&self) {
        self.shared.finish();
    }
}

/// A bidirectional sub-flow nested inside one streaming call.
///
/// Both directions are bounded FIFO queues (backpressure against a slow
/// peer or a slow consumer). The channel carries the owning call's
/// sequence number on every chunk; it is not reusable after it reports
/// [`SessionError::StreamStopped`] or after [`StreamChannel::close`].
pub struct StreamChannel {
    /// Envelope identity of the owning call; every outbound chunk is
    /// derived from it via `without_payload`.
    param: Message,
    inbound: Receiver<Message>,
    outbound: SyncSender<Message>,
    shared: Arc<StreamShared>,
}

impl StreamChannel {
    /// The owning call's sequence number.
    pub fn seq(&self) -> u32 {
        self.param.seq
    }

    /// Encode `value` and enqueue it as a `StreamData` chunk.
    ///
    /// Blocks while the outbound queue is full.
    pub fn send<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(fault) = self.shared.fault() {
            return Err(fault.into());
        }
        let mut msg = self.param.without_payload();
        msg.kind = MessageKind::StreamData;
        msg.encode_value(value)?;
        self.outbound
            .send(msg)
            .map_err(|_| SessionError::TransportClosed)
    }

    /// Receive and decode the next chunk.
    ///
    /// If the sticky fault is set, it is returned immediately without
    /// blocking; otherwise blocks until a chunk arrives. After a clean
    /// close, queued chunks drain first and then every call reports
    /// [`SessionError::StreamStopped`].
    pub fn recv<T: DeserializeOwned>(&self) -> Result<T> {
        if let Some(fault) = self.shared.fault() {
            return Err(fault.into());
        }
        match self.inbound.recv() {
            Ok(msg) => Ok(msg.decode_value()?),
            Err(_) => Err(self
                .shared
                .fault()
                .map(Into::into)
                .unwrap_or(SessionError::StreamStopped)),
        }
    }

    /// Send the end-of-stream marker for this call.
    ///
    /// Whichever side finishes producing sends it. Chunks already queued
    /// in either direction are not discarded.
    pub fn close(&self) -> Result<()> {
        let mut msg = self.param.without_payload();
        msg.kind = MessageKind::StreamClose;
        self.outbound
            .send(msg)
            .map_err(|_| SessionError::TransportClosed)
    }

    /// True once the stream has completed (cleanly or with a fault).
    pub fn is_closed(&self) -> bool {
        self.shared.is_done()
    }

    /// Block until the stream completes.
    pub fn wait_closed(&self) {
        self.shared.wait_done();
    }
}

/// Build the two halves of a stream bound to one call.
///
/// Outbound chunks pass through their own bounded queue, drained into the
/// connection's writer queue by a forwarder thread — per-stream
/// backpressure without breaking the single-writer discipline.
pub(crate) fn stream_pair(
    param: Message,
    depth: usize,
    writer_tx: SyncSender<Message>,
) -> Result<(StreamSlot, StreamChannel)> {
    let (inbound_tx, inbound_rx) = std::sync::mpsc::sync_channel(depth);
    let (outbound_tx, outbound_rx) = std::sync::mpsc::sync_channel::<Message>(depth);
    let shared = StreamShared::new();

    let seq = param.seq;
    std::thread::Builder::new()
        .name(format!("rpcmux-stream-{seq}"))
        .spawn(move || {
            while let Ok(msg) = outbound_rx.recv() {
                if writer_tx.send(msg).is_err() {
                    debug!(seq, "writer gone; stopping stream forwarder");
                    break;
                }
            }
        })
        .map_err(SessionError::Spawn)?;

    let slot = StreamSlot {
        inbound_tx,
        shared: Arc::clone(&shared),
    };
    let channel = StreamChannel {
        param,
        inbound: inbound_rx,
        outbound: outbound_tx,
        shared,
    };
    Ok((slot, channel))
}
