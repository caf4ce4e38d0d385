//! Domain Errors for the RLPx transport
//!
//! Every error here is fatal to the connection it occurs on: the nonces and
//! MAC accumulators cannot be repaired mid-session, so there is no
//! frame-level retry. Reconnection policy belongs to the dialer/listener.

use super::base_protocol::DisconnectReason;
use shared_crypto::CryptoError;
use thiserror::Error;

/// Top-level error for every fallible transport operation.
#[derive(Debug, Error)]
pub enum RlpxError {
    /// Encryption or protocol handshake failed
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Frame MAC mismatch (the ingress MAC state is now desynchronized)
    #[error("frame authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    /// Peer violated the framing or base protocol
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// Underlying stream failed or timed out
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl From<std::io::Error> for RlpxError {
    fn from(error: std::io::Error) -> Self {
        Self::Transport(TransportError::from(error))
    }
}

impl RlpxError {
    /// Disconnect reason to send to the remote when this error ends a session.
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::Handshake(HandshakeError::UnexpectedIdentity) => {
                DisconnectReason::UnexpectedIdentity
            }
            Self::Handshake(HandshakeError::SelfConnection) => DisconnectReason::SelfConnection,
            Self::Handshake(HandshakeError::UnsupportedVersion(_)) => {
                DisconnectReason::IncompatibleVersion
            }
            Self::Protocol(ProtocolError::Rejected(reason)) => *reason,
            Self::Protocol(ProtocolError::InboundQueueFull(_)) => {
                DisconnectReason::SubprotocolError
            }
            Self::Handshake(_) | Self::Authentication(_) | Self::Protocol(_) => {
                DisconnectReason::ProtocolError
            }
            Self::Transport(TransportError::Timeout { .. }) => DisconnectReason::Timeout,
            Self::Transport(_) => DisconnectReason::TcpError,
        }
    }
}

/// Errors raised while running the encryption or protocol handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Remote declared a handshake version other than 4
    #[error("unsupported handshake version {0}")]
    UnsupportedVersion(u8),

    /// Auth message could not be decrypted or decoded
    #[error("malformed auth message: {0}")]
    MalformedAuth(String),

    /// Auth-ack message could not be decrypted or decoded
    #[error("malformed auth-ack message: {0}")]
    MalformedAck(String),

    /// Remote protocol handshake (Hello) could not be decoded
    #[error("malformed hello: {0}")]
    MalformedHello(String),

    /// Ephemeral key recovery from the auth signature failed
    #[error("signature recovery failed: {0}")]
    SignatureRecovery(CryptoError),

    /// Key agreement or key parsing failed
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// Hello identity differs from the key proven in the encryption handshake
    #[error("hello identity does not match handshake identity")]
    UnexpectedIdentity,

    /// Remote identity equals our own
    #[error("connection to self")]
    SelfConnection,

    /// A step ran before the step it depends on
    #[error("handshake step out of order: {0} missing")]
    MissingState(&'static str),
}

/// Frame authentication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// Header tag differs from the tag derived from the ingress MAC
    #[error("header MAC mismatch")]
    HeaderMacMismatch,

    /// Body tag differs from the tag derived from the ingress MAC
    #[error("frame MAC mismatch")]
    BodyMacMismatch,

    /// A previous frame failed; the ingress MAC can never validate again
    #[error("ingress MAC desynchronized by an earlier failure")]
    Desynchronized,
}

/// Framing and base-protocol violations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Wire code outside every negotiated capability range
    #[error("no capability bound to message code {0}")]
    UnknownMessageCode(u64),

    /// Sub-protocol tried to send a code beyond its declared length
    #[error("message code {code} outside protocol length {length}")]
    CodeOutOfRange {
        /// Local (pre-offset) code
        code: u64,
        /// Declared code-space length
        length: u64,
    },

    /// Frame body exceeds the configured limit
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Declared frame size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// A Hello arrived after the protocol handshake completed
    #[error("unexpected hello after handshake")]
    UnexpectedHello,

    /// First frame was not a Hello
    #[error("expected hello, got message code {0}")]
    ExpectedHello(u64),

    /// Remote ended the session during the protocol handshake
    #[error("remote disconnected: {0}")]
    Disconnected(DisconnectReason),

    /// This side refused the session after the handshakes
    #[error("session rejected: {0}")]
    Rejected(DisconnectReason),

    /// A bound protocol fell too far behind the remote's messages
    #[error("inbound queue full for {0}")]
    InboundQueueFull(String),

    /// RLP decoding failed
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<rlp::DecoderError> for ProtocolError {
    fn from(error: rlp::DecoderError) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Stream-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O failure on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote closed the stream
    #[error("connection closed by remote")]
    Closed,

    /// A bounded phase did not complete in time
    #[error("{phase} timed out")]
    Timeout {
        /// Phase that timed out
        phase: &'static str,
    },

    /// Operation on a connection that is not in the required stage
    #[error("connection not ready: {0}")]
    NotReady(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_maps_to_transport() {
        let error = RlpxError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(matches!(error, RlpxError::Transport(TransportError::Io(_))));
        assert_eq!(error.disconnect_reason(), DisconnectReason::TcpError);
    }

    #[test]
    fn test_disconnect_reason_mapping() {
        let cases: Vec<(RlpxError, DisconnectReason)> = vec![
            (
                AuthenticationError::BodyMacMismatch.into(),
                DisconnectReason::ProtocolError,
            ),
            (
                HandshakeError::UnexpectedIdentity.into(),
                DisconnectReason::UnexpectedIdentity,
            ),
            (HandshakeError::SelfConnection.into(), DisconnectReason::SelfConnection),
            (
                HandshakeError::UnsupportedVersion(5).into(),
                DisconnectReason::IncompatibleVersion,
            ),
            (
                TransportError::Timeout { phase: "ping" }.into(),
                DisconnectReason::Timeout,
            ),
            (
                ProtocolError::UnknownMessageCode(99).into(),
                DisconnectReason::ProtocolError,
            ),
            (
                ProtocolError::Rejected(DisconnectReason::TooManyPeers).into(),
                DisconnectReason::TooManyPeers,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.disconnect_reason(), expected, "{}", error);
        }
    }

    #[test]
    fn test_error_display() {
        let error = RlpxError::from(ProtocolError::CodeOutOfRange { code: 20, length: 17 });
        assert_eq!(
            error.to_string(),
            "protocol violation: message code 20 outside protocol length 17"
        );
    }
}
