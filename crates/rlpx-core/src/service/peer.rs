//! # Peer Session
//!
//! Runs one established connection: negotiates capabilities, binds local
//! sub-protocols to wire-code ranges and dispatches inbound frames.
//!
//! ## Tasks
//!
//! ```text
//!            ┌──────────── read loop (Peer::run) ────────────┐
//! stream ───▶│ read_msg ─▶ base codes: Ping/Pong/Disconnect  │
//!            │          └▶ sub-protocol codes ─▶ queue[i] ───┼──▶ consumer task i
//!            └───────────────────────────────────────────────┘       │
//!                   keepalive task ──▶ writer ◀── send_data ─────────┘
//! ```
//!
//! The reader is owned by the read loop alone. The writer is shared behind
//! one async mutex so frames from different protocols never interleave.
//! Queues are bounded and dispatch never waits on a slow consumer: a full
//! queue ends the session with `SubprotocolError`.

use super::context::ProtocolContext;
use crate::domain::{
    decode_disconnect, CapabilityTable, DisconnectReason, Message, NodeId, ProtocolError,
    ProtocolHandshake, ProtocolSpec, RlpxError, TransportError, BASE_PROTOCOL_LENGTH,
    DISCONNECT, EMPTY_LIST, HELLO, PING, PONG,
};
use crate::ports::Protocol;
use crate::transport::{Connection, FrameReader, FrameWriter, DISCONNECT_TIMEOUT};
use futures::FutureExt;
use std::fmt;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a session ended.
#[derive(Debug)]
pub enum PeerExit {
    /// This side disconnected (explicitly, on shutdown or on keepalive timeout)
    LocalDisconnect(DisconnectReason),
    /// The remote sent `Disconnect`
    RemoteDisconnect(DisconnectReason),
    /// The session failed
    Failed(RlpxError),
}

impl PeerExit {
    /// Reason associated with the exit, as sent or received on the wire.
    pub fn reason(&self) -> DisconnectReason {
        match self {
            Self::LocalDisconnect(reason) | Self::RemoteDisconnect(reason) => *reason,
            Self::Failed(error) => error.disconnect_reason(),
        }
    }
}

impl fmt::Display for PeerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalDisconnect(reason) => write!(f, "local disconnect: {}", reason),
            Self::RemoteDisconnect(reason) => write!(f, "remote disconnect: {}", reason),
            Self::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

// =============================================================================
// PEER HANDLE
// =============================================================================

struct PeerShared {
    remote_id: NodeId,
    remote_hello: ProtocolHandshake,
    capabilities: CapabilityTable,
    writer: Mutex<FrameWriter>,
    /// Set once the session is ending; the value is the reason
    shutdown: watch::Sender<Option<DisconnectReason>>,
    closed: watch::Sender<bool>,
    last_seen: parking_lot::Mutex<Instant>,
}

impl PeerShared {
    fn mark_closing(&self, reason: DisconnectReason) {
        self.shutdown.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct PeerHandle {
    inner: Arc<PeerShared>,
}

impl PeerHandle {
    /// Remote static identity.
    pub fn remote_id(&self) -> NodeId {
        self.inner.remote_id
    }

    /// Remote Hello.
    pub fn remote_hello(&self) -> &ProtocolHandshake {
        &self.inner.remote_hello
    }

    /// Negotiated capabilities and their wire-code ranges.
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.inner.capabilities
    }

    /// True once the session has started to close.
    pub fn is_closing(&self) -> bool {
        self.inner.shutdown.borrow().is_some()
    }

    /// Reason the session is closing with, sent or received.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.inner.shutdown.borrow()
    }

    /// True once the session has fully ended.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Send `Disconnect` and end the session. Idempotent.
    pub async fn disconnect(&self, reason: DisconnectReason) {
        if self.is_closing() {
            return;
        }
        debug!(remote = %self.remote_id(), %reason, "disconnecting");
        self.send_disconnect_frame(reason).await;
        self.inner.mark_closing(reason);
    }

    /// Wait until the session has ended and every binding was notified.
    ///
    /// Must not be awaited from inside a protocol handler of the same
    /// session: the session waits for its handlers before it closes.
    pub async fn closed(&self) {
        let mut closed = self.inner.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Answer a `Ping`.
    ///
    /// A local disconnect that closed the writer first is not an error: the
    /// read loop picks up its reason.
    pub(crate) async fn answer_ping(&self) -> Result<(), RlpxError> {
        match self.send_raw(PONG, &EMPTY_LIST).await {
            Err(RlpxError::Transport(TransportError::Closed)) if self.settle_closing().await => Ok(()),
            other => other,
        }
    }

    /// Wait briefly for a local disconnect whose frame is already out.
    async fn settle_closing(&self) -> bool {
        let mut shutdown = self.inner.shutdown.subscribe();
        let settled = matches!(
            tokio::time::timeout(DISCONNECT_TIMEOUT, shutdown.wait_for(Option::is_some)).await,
            Ok(Ok(_))
        );
        settled
    }

    /// Send one frame with a wire code.
    pub(crate) async fn send_raw(&self, code: u64, payload: &[u8]) -> Result<(), RlpxError> {
        if self.is_closing() {
            return Err(TransportError::Closed.into());
        }
        self.inner.writer.lock().await.send(code, payload).await
    }

    async fn send_disconnect_frame(&self, reason: DisconnectReason) {
        let mut writer = self.inner.writer.lock().await;
        if writer.is_closed() {
            return;
        }
        match tokio::time::timeout(DISCONNECT_TIMEOUT, writer.send_disconnect(reason)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(remote = %self.remote_id(), %error, "disconnect not delivered"),
            Err(_) => debug!(remote = %self.remote_id(), "disconnect write timed out"),
        }
    }

    fn touch(&self) {
        *self.inner.last_seen.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.inner.last_seen.lock().elapsed()
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("remote_id", &self.inner.remote_id)
            .field("client", &self.inner.remote_hello.client_name)
            .field("capabilities", &self.inner.capabilities.len())
            .finish()
    }
}

// =============================================================================
// PEER
// =============================================================================

struct Binding {
    range: Range<u64>,
    capability: String,
    queue: mpsc::Sender<(u64, Vec<u8>)>,
}

/// An established session waiting to be run.
pub struct Peer {
    handle: PeerHandle,
    reader: FrameReader,
    protocols: Vec<Arc<dyn Protocol>>,
    ping_interval: Option<Duration>,
    queue_capacity: usize,
}

impl Peer {
    /// Build a session from a connection that completed both handshakes.
    ///
    /// Capabilities are negotiated here; protocols without a shared
    /// capability are left unbound.
    ///
    /// # Errors
    ///
    /// `TransportError::NotReady` if either handshake has not completed.
    pub fn new(connection: Connection, protocols: Vec<Arc<dyn Protocol>>) -> Result<Self, RlpxError> {
        let parts = connection.into_parts()?;
        let local: Vec<ProtocolSpec> = protocols.iter().map(|protocol| protocol.spec()).collect();
        let capabilities = CapabilityTable::negotiate(&local, &parts.remote_hello.caps);

        let (shutdown, _) = watch::channel(None);
        let (closed, _) = watch::channel(false);
        let handle = PeerHandle {
            inner: Arc::new(PeerShared {
                remote_id: parts.remote_id,
                remote_hello: parts.remote_hello,
                capabilities,
                writer: Mutex::new(parts.writer),
                shutdown,
                closed,
                last_seen: parking_lot::Mutex::new(Instant::now()),
            }),
        };

        Ok(Self {
            handle,
            reader: parts.reader,
            protocols,
            ping_interval: parts.config.ping_interval,
            queue_capacity: parts.config.inbound_queue_capacity.max(1),
        })
    }

    /// Handle for controlling the session once it runs.
    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    /// Drive the session until it ends.
    ///
    /// Every bound protocol has seen `disconnected` by the time this
    /// returns.
    pub async fn run(self) -> PeerExit {
        let Peer {
            handle,
            mut reader,
            protocols,
            ping_interval,
            queue_capacity,
        } = self;
        let remote = handle.remote_id();
        info!(
            remote = %remote,
            client = %handle.remote_hello().client_name,
            capabilities = ?handle.capabilities().entries().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "peer session started"
        );

        let (bindings, consumers) = bind_protocols(&handle, &protocols, queue_capacity);
        let keepalive = ping_interval.map(|interval| tokio::spawn(keepalive(handle.clone(), interval)));
        let mut shutdown = handle.inner.shutdown.subscribe();

        let exit = loop {
            let requested = *shutdown.borrow_and_update();
            if let Some(reason) = requested {
                break PeerExit::LocalDisconnect(reason);
            }

            // Abandoning a partial read is fine here: the session is ending
            let result = tokio::select! {
                biased;
                _ = shutdown.changed() => continue,
                result = reader.read_msg() => result,
            };

            let outcome = match result {
                Ok(message) => dispatch(&handle, &bindings, message).await,
                Err(error) => Err(error),
            };
            match outcome {
                Ok(None) => {}
                Ok(Some(exit)) => break exit,
                Err(error) => {
                    if !matches!(error, RlpxError::Transport(_)) {
                        handle.send_disconnect_frame(error.disconnect_reason()).await;
                    }
                    break PeerExit::Failed(error);
                }
            }
        };

        handle.inner.mark_closing(exit.reason());
        if let Some(task) = keepalive {
            task.abort();
        }
        if tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            handle.inner.writer.lock().await.shutdown().await;
        })
        .await
        .is_err()
        {
            debug!(remote = %remote, "writer shutdown timed out");
        }

        // Closing the queues lets each consumer drain and run `disconnected`
        drop(bindings);
        for consumer in consumers {
            if let Err(error) = consumer.await {
                error!(remote = %remote, %error, "protocol consumer task failed");
            }
        }

        match &exit {
            PeerExit::Failed(error) => warn!(remote = %remote, %error, "peer session failed"),
            other => info!(remote = %remote, exit = %other, "peer session ended"),
        }
        handle.inner.closed.send_replace(true);
        exit
    }
}

fn bind_protocols(
    handle: &PeerHandle,
    protocols: &[Arc<dyn Protocol>],
    queue_capacity: usize,
) -> (Vec<Binding>, Vec<JoinHandle<()>>) {
    let entries = handle.capabilities().entries();
    let mut bindings = Vec::with_capacity(entries.len());
    let mut consumers = Vec::with_capacity(entries.len());

    for entry in entries {
        let (queue, inbound) = mpsc::channel(queue_capacity);
        let context = ProtocolContext::new(handle.clone(), entry.clone());
        let protocol = protocols[entry.protocol_index].clone();
        consumers.push(tokio::spawn(run_binding(protocol, context, inbound)));
        bindings.push(Binding {
            range: entry.range(),
            capability: entry.to_string(),
            queue,
        });
    }
    (bindings, consumers)
}

/// Consumer task for one bound protocol.
async fn run_binding(
    protocol: Arc<dyn Protocol>,
    context: ProtocolContext,
    mut inbound: mpsc::Receiver<(u64, Vec<u8>)>,
) {
    let remote = context.remote_id();
    let capability = context.capability().to_string();

    if AssertUnwindSafe(protocol.connected(&context))
        .catch_unwind()
        .await
        .is_err()
    {
        error!(remote = %remote, %capability, "connected handler panicked");
    }

    while let Some((code, payload)) = inbound.recv().await {
        match AssertUnwindSafe(protocol.received(&context, code, payload))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(remote = %remote, %capability, code, %error, "message handler failed");
            }
            Err(_) => error!(remote = %remote, %capability, code, "message handler panicked"),
        }
    }

    if AssertUnwindSafe(protocol.disconnected(&context))
        .catch_unwind()
        .await
        .is_err()
    {
        error!(remote = %remote, %capability, "disconnected handler panicked");
    }
}

/// Route one inbound message. `Ok(Some(_))` ends the session.
async fn dispatch(
    handle: &PeerHandle,
    bindings: &[Binding],
    message: Message,
) -> Result<Option<PeerExit>, RlpxError> {
    handle.touch();

    if message.code < BASE_PROTOCOL_LENGTH {
        return match message.code {
            HELLO => Err(ProtocolError::UnexpectedHello.into()),
            DISCONNECT => {
                let reason = decode_disconnect(&message.payload).map_err(ProtocolError::from)?;
                Ok(Some(PeerExit::RemoteDisconnect(reason)))
            }
            PING => {
                handle.answer_ping().await?;
                Ok(None)
            }
            PONG => Ok(None),
            code => {
                debug!(remote = %handle.remote_id(), code, "ignoring reserved base protocol code");
                Ok(None)
            }
        };
    }

    let binding = bindings
        .iter()
        .find(|binding| binding.range.contains(&message.code))
        .ok_or(ProtocolError::UnknownMessageCode(message.code))?;
    let local_code = message.code - binding.range.start;
    match binding.queue.try_send((local_code, message.payload)) {
        Ok(()) => Ok(None),
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(
                remote = %handle.remote_id(),
                capability = %binding.capability,
                "inbound queue full"
            );
            Err(ProtocolError::InboundQueueFull(binding.capability.clone()).into())
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(remote = %handle.remote_id(), code = message.code, "protocol consumer gone");
            Ok(None)
        }
    }
}

/// Periodic Ping; disconnects with `Timeout` when the remote goes silent.
async fn keepalive(handle: PeerHandle, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if handle.is_closing() {
            return;
        }
        if handle.idle_for() > interval * 2 {
            warn!(remote = %handle.remote_id(), "no traffic from peer, disconnecting");
            handle.disconnect(DisconnectReason::Timeout).await;
            return;
        }
        if let Err(error) = handle.send_raw(PING, &EMPTY_LIST).await {
            debug!(remote = %handle.remote_id(), %error, "ping failed");
            return;
        }
    }
}
