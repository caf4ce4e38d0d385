//! RLPx connection: encryption handshake, then protocol handshake, over one
//! duplex byte stream.
//!
//! ```text
//! Raw ──encryption_handshake──▶ Framed ──protocol_handshake──▶ Framed (+ remote Hello)
//!  │                              │
//!  └──────── any failure ─────────┴──▶ Closed (stream released)
//! ```

use super::config::RlpxConfig;
use super::framed::{read_full, BoxedReader, BoxedWriter, FrameReader, FrameWriter};
use crate::domain::{
    decode_disconnect, declared_size, open, seal, AuthAck, AuthMsg, DisconnectReason,
    EncryptionHandshake, FrameCodec, HandshakeError, Message, NodeId, PacketKind,
    ProtocolError, ProtocolHandshake, RlpxError, TransportError, DISCONNECT, HELLO,
    MAX_HELLO_SIZE, PREFIX_LENGTH,
};
use shared_crypto::Secp256k1KeyPair;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Bound on the best-effort `Disconnect` write.
pub(crate) const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest Hello frame body: an RLP message code plus a Hello payload.
const HELLO_FRAME_LIMIT: usize = MAX_HELLO_SIZE + 9;

enum Stage {
    Raw {
        reader: BoxedReader,
        writer: BoxedWriter,
    },
    Framed {
        reader: FrameReader,
        writer: FrameWriter,
    },
    Closed,
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::Raw { .. } => "raw",
            Self::Framed { .. } => "framed",
            Self::Closed => "closed",
        }
    }
}

/// One RLPx connection over a duplex stream.
pub struct Connection {
    config: RlpxConfig,
    stage: Stage,
    remote_id: Option<NodeId>,
    remote_hello: Option<ProtocolHandshake>,
}

impl Connection {
    /// Wrap a freshly connected stream.
    pub fn new<S>(stream: S, config: RlpxConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            config,
            stage: Stage::Raw {
                reader: Box::new(reader),
                writer: Box::new(writer),
            },
            remote_id: None,
            remote_hello: None,
        }
    }

    /// Remote identity, once the encryption handshake has completed.
    pub fn remote_id(&self) -> Option<NodeId> {
        self.remote_id
    }

    /// Remote Hello, once the protocol handshake has completed.
    pub fn remote_hello(&self) -> Option<&ProtocolHandshake> {
        self.remote_hello.as_ref()
    }

    /// Configuration this connection runs with.
    pub fn config(&self) -> &RlpxConfig {
        &self.config
    }

    /// Whether the frame codec is installed.
    pub fn is_framed(&self) -> bool {
        matches!(self.stage, Stage::Framed { .. })
    }

    // =========================================================================
    // ENCRYPTION HANDSHAKE
    // =========================================================================

    /// Run the auth / auth-ack exchange and install the frame codec.
    ///
    /// Supplying `remote_id` makes this side the initiator; otherwise it waits
    /// for an inbound auth. Returns the remote's proven identity. On failure
    /// or timeout the stream is released and the connection is closed.
    ///
    /// # Errors
    ///
    /// Any `HandshakeError`, I/O failure or `TransportError::Timeout`.
    pub async fn encryption_handshake(
        &mut self,
        private_key: &Arc<Secp256k1KeyPair>,
        remote_id: Option<NodeId>,
    ) -> Result<NodeId, RlpxError> {
        let (reader, writer) = match std::mem::replace(&mut self.stage, Stage::Closed) {
            Stage::Raw { reader, writer } => (reader, writer),
            other => {
                let stage = other.name();
                self.stage = other;
                debug!(stage, "encryption handshake on non-raw connection");
                return Err(TransportError::NotReady("encryption handshake already ran").into());
            }
        };

        let exchange = Self::run_encryption_handshake(
            private_key.clone(),
            remote_id,
            reader,
            writer,
            self.config.max_frame_size,
        );
        let (reader, writer, remote) =
            bounded(self.config.handshake_timeout, "encryption handshake", exchange).await?;

        self.stage = Stage::Framed { reader, writer };
        self.remote_id = Some(remote);
        debug!(remote = %remote, initiator = remote_id.is_some(), "encryption handshake complete");
        Ok(remote)
    }

    async fn run_encryption_handshake(
        private_key: Arc<Secp256k1KeyPair>,
        remote_id: Option<NodeId>,
        mut reader: BoxedReader,
        mut writer: BoxedWriter,
        max_frame_size: usize,
    ) -> Result<(FrameReader, FrameWriter, NodeId), RlpxError> {
        let initiator = remote_id.is_some();
        let mut handshake = EncryptionHandshake::new(private_key.clone(), remote_id)?;

        let (auth_packet, ack_packet) = match handshake.remote_public_key().copied() {
            Some(remote_key) => {
                let auth = handshake.auth_msg()?;
                let auth_packet = seal(&auth, &remote_key)?;
                writer.write_all(&auth_packet).await?;
                writer.flush().await?;
                trace!(size = auth_packet.len(), "auth sent");

                let ack_packet = read_packet(&mut reader, PacketKind::AuthAck).await?;
                let ack: AuthAck = open(&private_key, &ack_packet, PacketKind::AuthAck)?;
                handshake.handle_auth_ack_msg(&ack)?;
                (auth_packet, ack_packet)
            }
            None => {
                let auth_packet = read_packet(&mut reader, PacketKind::Auth).await?;
                let auth: AuthMsg = open(&private_key, &auth_packet, PacketKind::Auth)?;
                handshake.handle_auth_msg(&auth)?;

                let ack = handshake.auth_ack_msg();
                let ack_packet = seal(&ack, &auth.initiator_pubkey)?;
                writer.write_all(&ack_packet).await?;
                writer.flush().await?;
                trace!(size = ack_packet.len(), "auth-ack sent");
                (auth_packet, ack_packet)
            }
        };

        let secrets = handshake.extract_secrets(&auth_packet, &ack_packet, initiator)?;
        let remote = secrets.remote_id;
        let (encoder, decoder) = FrameCodec::new(secrets, max_frame_size).split();
        Ok((
            FrameReader::new(reader, decoder),
            FrameWriter::new(writer, encoder),
            remote,
        ))
    }

    // =========================================================================
    // PROTOCOL HANDSHAKE
    // =========================================================================

    /// Exchange Hello messages as the first frame in each direction.
    ///
    /// Both sides send without waiting for the other, so the local Hello is
    /// written while the remote one is being read.
    ///
    /// # Errors
    ///
    /// `HandshakeError::MalformedHello` / `UnexpectedIdentity`,
    /// `ProtocolError::ExpectedHello` / `Disconnected`, authentication and
    /// I/O failures, and `TransportError::Timeout`. The connection is closed
    /// on failure except for errors raised after the exchange itself.
    pub async fn protocol_handshake(
        &mut self,
        local: &ProtocolHandshake,
    ) -> Result<ProtocolHandshake, RlpxError> {
        let expected = self
            .remote_id
            .ok_or(TransportError::NotReady("encryption handshake not complete"))?;
        let timeout = self.config.handshake_timeout;

        let Stage::Framed { reader, writer } = &mut self.stage else {
            return Err(TransportError::NotReady("connection is not framed").into());
        };

        let payload = rlp::encode(local).to_vec();
        let exchange = async {
            tokio::try_join!(writer.send(HELLO, &payload), read_hello(reader))
        };
        let remote = match bounded(timeout, "protocol handshake", exchange).await {
            Ok((_, hello)) => hello,
            Err(e) => {
                // A timed-out read may have consumed part of a frame
                self.stage = Stage::Closed;
                return Err(e);
            }
        };

        if remote.id != expected {
            debug!(remote = %expected, claimed = %remote.id, "hello identity mismatch");
            return Err(HandshakeError::UnexpectedIdentity.into());
        }

        debug!(
            remote = %expected,
            client = %remote.client_name,
            caps = remote.caps.len(),
            "protocol handshake complete"
        );
        self.remote_hello = Some(remote.clone());
        Ok(remote)
    }

    // =========================================================================
    // FRAMED I/O
    // =========================================================================

    /// Send one frame.
    ///
    /// # Errors
    ///
    /// `TransportError::NotReady` before the encryption handshake, otherwise
    /// encoding and I/O failures.
    pub async fn send_data(&mut self, code: u64, payload: &[u8]) -> Result<(), RlpxError> {
        match &mut self.stage {
            Stage::Framed { writer, .. } => writer.send(code, payload).await,
            _ => Err(TransportError::NotReady("connection is not framed").into()),
        }
    }

    /// Read one frame.
    ///
    /// # Errors
    ///
    /// `TransportError::NotReady` before the encryption handshake, otherwise
    /// authentication, decoding and I/O failures. All of them are fatal.
    pub async fn read_msg(&mut self) -> Result<Message, RlpxError> {
        match &mut self.stage {
            Stage::Framed { reader, .. } => reader.read_msg().await,
            _ => Err(TransportError::NotReady("connection is not framed").into()),
        }
    }

    /// Best-effort `Disconnect`, then release the stream.
    pub async fn disconnect(&mut self, reason: DisconnectReason) {
        if let Stage::Framed { writer, .. } = &mut self.stage {
            let sent = tokio::time::timeout(DISCONNECT_TIMEOUT, writer.send_disconnect(reason)).await;
            if !matches!(sent, Ok(Ok(()))) {
                debug!(%reason, "disconnect not delivered");
            }
            writer.shutdown().await;
        }
        self.stage = Stage::Closed;
    }

    /// Hand the framed halves to a session runner.
    ///
    /// # Errors
    ///
    /// `TransportError::NotReady` unless both handshakes have completed.
    pub fn into_parts(self) -> Result<ConnectionParts, RlpxError> {
        match (self.stage, self.remote_id, self.remote_hello) {
            (Stage::Framed { reader, writer }, Some(remote_id), Some(remote_hello)) => {
                Ok(ConnectionParts {
                    reader,
                    writer,
                    remote_id,
                    remote_hello,
                    config: self.config,
                })
            }
            _ => Err(TransportError::NotReady("handshakes not complete").into()),
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("stage", &self.stage.name())
            .field("remote_id", &self.remote_id)
            .finish_non_exhaustive()
    }
}

/// A connection that completed both handshakes, split for the session.
pub struct ConnectionParts {
    /// Ingress half
    pub reader: FrameReader,
    /// Egress half
    pub writer: FrameWriter,
    /// Proven remote identity
    pub remote_id: NodeId,
    /// Remote Hello
    pub remote_hello: ProtocolHandshake,
    /// Session configuration
    pub config: RlpxConfig,
}

/// Bound a handshake phase by `timeout`.
async fn bounded<T, F>(timeout: Duration, phase: &'static str, fut: F) -> Result<T, RlpxError>
where
    F: Future<Output = Result<T, RlpxError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout { phase }.into()),
    }
}

/// Read a size-prefixed handshake packet, prefix included.
async fn read_packet(reader: &mut BoxedReader, kind: PacketKind) -> Result<Vec<u8>, RlpxError> {
    let mut prefix = [0u8; PREFIX_LENGTH];
    read_full(reader, &mut prefix).await?;
    let size = declared_size(prefix, kind)?;

    let mut packet = vec![0u8; PREFIX_LENGTH + size];
    packet[..PREFIX_LENGTH].copy_from_slice(&prefix);
    read_full(reader, &mut packet[PREFIX_LENGTH..]).await?;
    trace!(?kind, size, "handshake packet received");
    Ok(packet)
}

/// Read the first frame and decode it as Hello.
async fn read_hello(reader: &mut FrameReader) -> Result<ProtocolHandshake, RlpxError> {
    let message = match reader.read_msg_within(HELLO_FRAME_LIMIT).await {
        Err(RlpxError::Protocol(ProtocolError::FrameTooLarge { size, max })) => {
            return Err(HandshakeError::MalformedHello(format!(
                "frame of {} bytes exceeds {}",
                size, max
            ))
            .into());
        }
        other => other?,
    };
    match message.code {
        HELLO => {
            if message.payload.len() > MAX_HELLO_SIZE {
                return Err(HandshakeError::MalformedHello(format!(
                    "{} bytes exceeds {}",
                    message.payload.len(),
                    MAX_HELLO_SIZE
                ))
                .into());
            }
            rlp::decode(&message.payload)
                .map_err(|e| HandshakeError::MalformedHello(e.to_string()).into())
        }
        DISCONNECT => {
            let reason = decode_disconnect(&message.payload).map_err(ProtocolError::from)?;
            Err(ProtocolError::Disconnected(reason).into())
        }
        code => Err(ProtocolError::ExpectedHello(code).into()),
    }
}
