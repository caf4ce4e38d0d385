//! # Server
//!
//! TCP listener and dialer that turns sockets into running peer sessions.
//!
//! Inbound sockets run the responder side of the encryption handshake,
//! dialed ones the initiator side. Both then exchange Hello, pass admission
//! (`max_peers`, duplicate identity, shutdown) and are handed to a spawned
//! [`Peer::run`]. Reconnection and backoff are left to the caller.

use super::peer::{Peer, PeerExit, PeerHandle};
use crate::domain::{
    DisconnectReason, Enode, NodeId, ProtocolError, ProtocolHandshake, RlpxError, TransportError,
};
use crate::ports::Protocol;
use crate::transport::{Connection, RlpxConfig};
use parking_lot::RwLock;
use shared_crypto::Secp256k1KeyPair;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Pause after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

struct ServerInner {
    config: RlpxConfig,
    private_key: Arc<Secp256k1KeyPair>,
    local_id: NodeId,
    protocols: Vec<Arc<dyn Protocol>>,
    peers: RwLock<HashMap<NodeId, PeerHandle>>,
    local_addr: RwLock<Option<SocketAddr>>,
    shutdown: watch::Sender<bool>,
}

/// RLPx listener and dialer.
///
/// ## Thread Safety
///
/// Cheap to clone; all clones share the same peer set.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Create a server for `private_key` offering `protocols`.
    pub fn new(
        config: RlpxConfig,
        private_key: Arc<Secp256k1KeyPair>,
        protocols: Vec<Arc<dyn Protocol>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let local_id = NodeId::from(private_key.public_key());
        Self {
            inner: Arc::new(ServerInner {
                config,
                private_key,
                local_id,
                protocols,
                peers: RwLock::new(HashMap::new()),
                local_addr: RwLock::new(None),
                shutdown,
            }),
        }
    }

    /// Our static identity.
    pub fn local_id(&self) -> NodeId {
        self.inner.local_id
    }

    /// Address the listener is bound to, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.read()
    }

    /// Our enode URL, once bound.
    pub fn enode(&self) -> Option<Enode> {
        self.local_addr().map(|addr| Enode::new(self.local_id(), addr))
    }

    /// The Hello this server sends.
    pub fn local_hello(&self) -> ProtocolHandshake {
        self.inner.local_hello()
    }

    /// Handles of all running sessions.
    pub fn peers(&self) -> Vec<PeerHandle> {
        self.inner.peers.read().values().cloned().collect()
    }

    /// Handle of the session with `id`, if any.
    pub fn peer(&self, id: &NodeId) -> Option<PeerHandle> {
        self.inner.peers.read().get(id).cloned()
    }

    /// Number of running sessions.
    pub fn peer_count(&self) -> usize {
        self.inner.peers.read().len()
    }

    /// Bind the listener and start accepting sessions.
    ///
    /// # Errors
    ///
    /// Returns the bind failure.
    pub async fn bind(&self, addr: SocketAddr) -> Result<SocketAddr, RlpxError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        *self.inner.local_addr.write() = Some(local);

        info!(addr = %local, id = %self.local_id(), "listening for RLPx sessions");
        tokio::spawn(accept_loop(self.inner.clone(), listener));
        Ok(local)
    }

    /// Connect to `enode` and run a session with it.
    ///
    /// Returns once both handshakes have completed and the session is
    /// running.
    ///
    /// # Errors
    ///
    /// `ProtocolError::Rejected` if admission fails, otherwise any connect,
    /// handshake or timeout error.
    pub async fn dial(&self, enode: &Enode) -> Result<PeerHandle, RlpxError> {
        if let Err(reason) = self.inner.check_admission(&enode.id) {
            return Err(ProtocolError::Rejected(reason).into());
        }

        debug!(remote = %enode.id, addr = %enode.addr, "dialing");
        let stream = tokio::time::timeout(
            self.inner.config.handshake_timeout,
            TcpStream::connect(enode.addr),
        )
        .await
        .map_err(|_| TransportError::Timeout { phase: "connect" })??;

        establish(&self.inner, stream, Some(enode.id)).await
    }

    /// Disconnect every session with `ClientQuitting`, stop accepting and
    /// wait until all sessions have ended.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let peers = self.peers();
        info!(peers = peers.len(), "shutting down RLPx server");

        futures::future::join_all(
            peers
                .iter()
                .map(|peer| peer.disconnect(DisconnectReason::ClientQuitting)),
        )
        .await;
        futures::future::join_all(peers.iter().map(|peer| peer.closed())).await;
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_id", &self.inner.local_id)
            .field("local_addr", &self.local_addr())
            .field("peers", &self.peer_count())
            .finish()
    }
}

impl ServerInner {
    fn local_hello(&self) -> ProtocolHandshake {
        let listen_port = match *self.local_addr.read() {
            Some(addr) if self.config.listen_port == 0 => addr.port(),
            _ => self.config.listen_port,
        };
        ProtocolHandshake::new(
            self.config.client_name.clone(),
            self.protocols
                .iter()
                .map(|protocol| protocol.spec().cap())
                .collect(),
            listen_port,
            self.local_id,
        )
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn check_admission(&self, id: &NodeId) -> Result<(), DisconnectReason> {
        Self::admission(self.is_shutting_down(), self.config.max_peers, &self.peers.read(), id)
    }

    fn admission(
        shutting_down: bool,
        max_peers: usize,
        peers: &HashMap<NodeId, PeerHandle>,
        id: &NodeId,
    ) -> Result<(), DisconnectReason> {
        if shutting_down {
            Err(DisconnectReason::ClientQuitting)
        } else if peers.contains_key(id) {
            Err(DisconnectReason::AlreadyConnected)
        } else if peers.len() >= max_peers {
            Err(DisconnectReason::TooManyPeers)
        } else {
            Ok(())
        }
    }
}

/// Run both handshakes on `stream`, admit the session and spawn it.
async fn establish(
    inner: &Arc<ServerInner>,
    stream: TcpStream,
    remote: Option<NodeId>,
) -> Result<PeerHandle, RlpxError> {
    if let Err(error) = stream.set_nodelay(true) {
        debug!(%error, "failed to set TCP_NODELAY");
    }

    let mut connection = Connection::new(stream, inner.config.clone());
    let remote_id = connection
        .encryption_handshake(&inner.private_key, remote)
        .await?;

    if let Err(error) = connection.protocol_handshake(&inner.local_hello()).await {
        connection.disconnect(error.disconnect_reason()).await;
        return Err(error);
    }

    let peer = Peer::new(connection, inner.protocols.clone())?;
    let handle = peer.handle();

    let admitted = {
        let mut peers = inner.peers.write();
        let verdict = ServerInner::admission(
            inner.is_shutting_down(),
            inner.config.max_peers,
            &peers,
            &remote_id,
        );
        if verdict.is_ok() {
            peers.insert(remote_id, handle.clone());
        }
        verdict
    };
    if let Err(reason) = admitted {
        debug!(remote = %remote_id, %reason, "session rejected");
        handle.disconnect(reason).await;
        return Err(ProtocolError::Rejected(reason).into());
    }

    tokio::spawn(run_session(inner.clone(), peer));
    Ok(handle)
}

async fn run_session(inner: Arc<ServerInner>, peer: Peer) {
    let remote = peer.handle().remote_id();
    let exit = peer.run().await;
    inner.peers.write().remove(&remote);

    if let PeerExit::Failed(error) = &exit {
        debug!(remote = %remote, %error, "session removed after failure");
    } else {
        debug!(remote = %remote, reason = %exit.reason(), "session removed");
    }
}

async fn accept_loop(inner: Arc<ServerInner>, listener: TcpListener) {
    let mut shutdown = inner.shutdown.subscribe();

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => continue,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        match establish(&inner, stream, None).await {
                            Ok(handle) => debug!(remote = %handle.remote_id(), %addr, "inbound session established"),
                            Err(error) => debug!(%addr, %error, "inbound session failed"),
                        }
                    });
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    debug!("accept loop stopped");
}
