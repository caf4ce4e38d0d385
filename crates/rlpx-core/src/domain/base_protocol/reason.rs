//! Disconnect reason codes.

use rlp::DecoderError;
use std::fmt;

/// Why a session is being closed, as carried in a `Disconnect` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DisconnectReason {
    /// Disconnect requested
    Requested = 0x00,
    /// TCP sub-system error
    TcpError = 0x01,
    /// Breach of protocol
    ProtocolError = 0x02,
    /// Useless peer
    UselessPeer = 0x03,
    /// Too many peers
    TooManyPeers = 0x04,
    /// Already connected
    AlreadyConnected = 0x05,
    /// Incompatible protocol version
    IncompatibleVersion = 0x06,
    /// Invalid node identity
    InvalidIdentity = 0x07,
    /// Client quitting
    ClientQuitting = 0x08,
    /// Unexpected identity in handshake
    UnexpectedIdentity = 0x09,
    /// Identity is the same as this node
    SelfConnection = 0x0a,
    /// Timeout on receiving a message
    Timeout = 0x0b,
    /// Some other reason specific to a sub-protocol
    SubprotocolError = 0x10,
}

impl DisconnectReason {
    /// Wire code.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for DisconnectReason {
    type Error = DecoderError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => Self::Requested,
            0x01 => Self::TcpError,
            0x02 => Self::ProtocolError,
            0x03 => Self::UselessPeer,
            0x04 => Self::TooManyPeers,
            0x05 => Self::AlreadyConnected,
            0x06 => Self::IncompatibleVersion,
            0x07 => Self::InvalidIdentity,
            0x08 => Self::ClientQuitting,
            0x09 => Self::UnexpectedIdentity,
            0x0a => Self::SelfConnection,
            0x0b => Self::Timeout,
            0x10 => Self::SubprotocolError,
            _ => return Err(DecoderError::Custom("unknown disconnect reason")),
        })
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Requested => "disconnect requested",
            Self::TcpError => "TCP sub-system error",
            Self::ProtocolError => "breach of protocol",
            Self::UselessPeer => "useless peer",
            Self::TooManyPeers => "too many peers",
            Self::AlreadyConnected => "already connected",
            Self::IncompatibleVersion => "incompatible protocol version",
            Self::InvalidIdentity => "invalid node identity",
            Self::ClientQuitting => "client quitting",
            Self::UnexpectedIdentity => "unexpected identity",
            Self::SelfConnection => "connected to self",
            Self::Timeout => "read timeout",
            Self::SubprotocolError => "sub-protocol error",
        };
        f.write_str(text)
    }
}
