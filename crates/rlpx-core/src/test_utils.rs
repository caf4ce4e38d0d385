//! Test utilities for RLPx sessions.
//!
//! In-memory connection pairs over `tokio::io::duplex` and a sub-protocol
//! that records every callback. Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! let eth = Arc::new(RecordingProtocol::new(ProtocolSpec::new("eth", 63, 17)));
//! let (local, remote) = connection_pair(RlpxConfig::for_testing(), vec![eth.spec().cap()], vec![eth.spec().cap()]).await?;
//! let peer = Peer::new(local, vec![eth.clone()])?;
//! ```

use crate::domain::{Cap, NodeId, ProtocolHandshake, ProtocolSpec, RlpxError};
use crate::ports::{BoxError, Protocol};
use crate::service::{Peer, ProtocolContext};
use crate::transport::{Connection, RlpxConfig};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::Secp256k1KeyPair;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Buffer size of each direction of an in-memory pair.
const DUPLEX_CAPACITY: usize = 256 * 1024;

// =============================================================================
// RECORDING PROTOCOL
// =============================================================================

/// One observed sub-protocol callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// `connected` ran for the session with this remote
    Connected(NodeId),
    /// `received` ran with a local code
    Received {
        /// Session remote
        remote: NodeId,
        /// Offset-subtracted code
        code: u64,
        /// Message payload
        payload: Vec<u8>,
    },
    /// `disconnected` ran for the session with this remote
    Disconnected(NodeId),
}

/// A [`Protocol`] that records every callback and can be told to misbehave.
pub struct RecordingProtocol {
    spec: ProtocolSpec,
    events: Mutex<Vec<ProtocolEvent>>,
    contexts: Mutex<Vec<ProtocolContext>>,
    notify: Notify,
    fail_on: Option<u64>,
    panic_on: Option<u64>,
    panic_on_disconnect: bool,
    gate: Option<watch::Sender<bool>>,
    echo: bool,
}

impl RecordingProtocol {
    /// Record callbacks for `spec`.
    pub fn new(spec: ProtocolSpec) -> Self {
        Self {
            spec,
            events: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            notify: Notify::new(),
            fail_on: None,
            panic_on: None,
            panic_on_disconnect: false,
            gate: None,
            echo: false,
        }
    }

    /// Return an error from `received` for `code`.
    #[must_use]
    pub fn failing_on(mut self, code: u64) -> Self {
        self.fail_on = Some(code);
        self
    }

    /// Panic inside `received` for `code`.
    #[must_use]
    pub fn panicking_on(mut self, code: u64) -> Self {
        self.panic_on = Some(code);
        self
    }

    /// Panic inside `disconnected` after recording it.
    #[must_use]
    pub fn panicking_on_disconnect(mut self) -> Self {
        self.panic_on_disconnect = true;
        self
    }

    /// Hold every `received` call until [`open_gate`](Self::open_gate).
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(watch::channel(false).0);
        self
    }

    /// Release held and future `received` calls.
    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.send_replace(true);
        }
    }

    /// Send every received message back with the same code.
    #[must_use]
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<ProtocolEvent> {
        self.events.lock().clone()
    }

    /// Received messages as `(code, payload)`.
    pub fn received(&self) -> Vec<(u64, Vec<u8>)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ProtocolEvent::Received { code, payload, .. } => Some((*code, payload.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of `disconnected` callbacks.
    pub fn disconnect_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ProtocolEvent::Disconnected(_)))
            .count()
    }

    /// Context of the most recently connected session.
    pub fn last_context(&self) -> Option<ProtocolContext> {
        self.contexts.lock().last().cloned()
    }

    /// Wait until `predicate` holds over the recorded events.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[ProtocolEvent]) -> bool,
    {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if predicate(self.events.lock().as_slice()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn record(&self, event: ProtocolEvent) {
        self.events.lock().push(event);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Protocol for RecordingProtocol {
    fn spec(&self) -> ProtocolSpec {
        self.spec.clone()
    }

    async fn connected(&self, ctx: &ProtocolContext) {
        self.contexts.lock().push(ctx.clone());
        self.record(ProtocolEvent::Connected(ctx.remote_id()));
    }

    async fn received(
        &self,
        ctx: &ProtocolContext,
        code: u64,
        payload: Vec<u8>,
    ) -> Result<(), BoxError> {
        self.record(ProtocolEvent::Received {
            remote: ctx.remote_id(),
            code,
            payload: payload.clone(),
        });

        if let Some(gate) = &self.gate {
            let _ = gate.subscribe().wait_for(|open| *open).await;
        }
        if self.panic_on == Some(code) {
            panic!("recording protocol told to panic on code {}", code);
        }
        if self.fail_on == Some(code) {
            return Err(format!("recording protocol told to fail on code {}", code).into());
        }
        if self.echo {
            ctx.send_data(code, &payload).await?;
        }
        Ok(())
    }

    async fn disconnected(&self, ctx: &ProtocolContext) {
        self.record(ProtocolEvent::Disconnected(ctx.remote_id()));
        if self.panic_on_disconnect {
            panic!("recording protocol told to panic on disconnect");
        }
    }
}

// =============================================================================
// CONNECTION PAIRS
// =============================================================================

/// A fresh static key.
pub fn node_key() -> Arc<Secp256k1KeyPair> {
    Arc::new(Secp256k1KeyPair::generate())
}

/// Hello advertising `caps` for `key`.
pub fn hello_for(key: &Secp256k1KeyPair, caps: Vec<Cap>) -> ProtocolHandshake {
    ProtocolHandshake::new("rlpx-test", caps, 0, NodeId::from(key.public_key()))
}

/// Two connections over one in-memory stream that completed the encryption
/// handshake. The first one dialed the second.
///
/// # Errors
///
/// Whichever side's handshake failed first.
pub async fn encrypted_pair(config: RlpxConfig) -> Result<(Connection, Connection), RlpxError> {
    let (initiator_key, responder_key) = (node_key(), node_key());
    encrypted_pair_with(config, &initiator_key, &responder_key).await
}

/// [`encrypted_pair`] with given static keys.
///
/// # Errors
///
/// Whichever side's handshake failed first.
pub async fn encrypted_pair_with(
    config: RlpxConfig,
    initiator_key: &Arc<Secp256k1KeyPair>,
    responder_key: &Arc<Secp256k1KeyPair>,
) -> Result<(Connection, Connection), RlpxError> {
    let (a, b) = tokio::io::duplex(DUPLEX_CAPACITY);
    let mut initiator = Connection::new(a, config.clone());
    let mut responder = Connection::new(b, config);

    let responder_id = NodeId::from(responder_key.public_key());
    let (dialed, accepted) = tokio::join!(
        initiator.encryption_handshake(initiator_key, Some(responder_id)),
        responder.encryption_handshake(responder_key, None),
    );
    dialed?;
    accepted?;
    Ok((initiator, responder))
}

/// Two connections that completed both handshakes, advertising the given
/// capabilities.
///
/// # Errors
///
/// Whichever side's handshake failed first.
pub async fn connection_pair(
    config: RlpxConfig,
    initiator_caps: Vec<Cap>,
    responder_caps: Vec<Cap>,
) -> Result<(Connection, Connection), RlpxError> {
    let (initiator_key, responder_key) = (node_key(), node_key());
    let (mut initiator, mut responder) =
        encrypted_pair_with(config, &initiator_key, &responder_key).await?;

    let initiator_hello = hello_for(&initiator_key, initiator_caps);
    let responder_hello = hello_for(&responder_key, responder_caps);
    let (dialed, accepted) = tokio::join!(
        initiator.protocol_handshake(&initiator_hello),
        responder.protocol_handshake(&responder_hello),
    );
    dialed?;
    accepted?;
    Ok((initiator, responder))
}

/// Two sessions built from a [`connection_pair`], each advertising the
/// capabilities of its own protocols.
///
/// # Errors
///
/// Whichever side's handshake failed first.
pub async fn peer_pair(
    config: RlpxConfig,
    initiator_protocols: Vec<Arc<dyn Protocol>>,
    responder_protocols: Vec<Arc<dyn Protocol>>,
) -> Result<(Peer, Peer), RlpxError> {
    let caps = |protocols: &[Arc<dyn Protocol>]| {
        protocols
            .iter()
            .map(|protocol| protocol.spec().cap())
            .collect::<Vec<_>>()
    };
    let (initiator, responder) = connection_pair(
        config,
        caps(&initiator_protocols),
        caps(&responder_protocols),
    )
    .await?;
    Ok((
        Peer::new(initiator, initiator_protocols)?,
        Peer::new(responder, responder_protocols)?,
    ))
}
