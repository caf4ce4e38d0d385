//! Base protocol message codes and payloads.

use super::reason::DisconnectReason;
use crate::domain::value_objects::{Cap, NodeId};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Protocol handshake, always the first frame in each direction.
pub const HELLO: u64 = 0x00;
/// Graceful close with a reason.
pub const DISCONNECT: u64 = 0x01;
/// Liveness probe.
pub const PING: u64 = 0x02;
/// Liveness reply.
pub const PONG: u64 = 0x03;

/// Wire codes reserved for the base protocol; sub-protocols start here.
pub const BASE_PROTOCOL_LENGTH: u64 = 16;

/// Advertised base protocol version (no Snappy compression).
pub const BASE_PROTOCOL_VERSION: u64 = 4;

/// Largest accepted Hello payload.
pub const MAX_HELLO_SIZE: usize = 2048;

/// RLP empty list, the payload of `Ping` and `Pong`.
pub const EMPTY_LIST: [u8; 1] = [0xc0];

// =============================================================================
// PROTOCOL HANDSHAKE
// =============================================================================

/// Hello message: what a node is and which capabilities it speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolHandshake {
    /// Base protocol version
    pub version: u64,
    /// Free-form client identifier
    pub client_name: String,
    /// Advertised capabilities
    pub caps: Vec<Cap>,
    /// Advertised TCP listen port (0 if not listening)
    pub listen_port: u16,
    /// Static identity of the sender
    pub id: NodeId,
}

impl ProtocolHandshake {
    /// Create a Hello at the current base protocol version.
    pub fn new(client_name: impl Into<String>, caps: Vec<Cap>, listen_port: u16, id: NodeId) -> Self {
        Self {
            version: BASE_PROTOCOL_VERSION,
            client_name: client_name.into(),
            caps,
            listen_port,
            id,
        }
    }
}

impl Encodable for ProtocolHandshake {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.version);
        s.append(&self.client_name);
        s.append_list::<Cap, Cap>(&self.caps);
        s.append(&self.listen_port);
        s.append(&self.id);
    }
}

impl Decodable for ProtocolHandshake {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        // Newer peers may append fields; only the first five are read
        if rlp.item_count()? < 5 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        // The port travels as a plain integer; out-of-range values read as not listening
        let listen_port: u64 = rlp.val_at(3)?;
        Ok(Self {
            version: rlp.val_at(0)?,
            client_name: rlp.val_at(1)?,
            caps: rlp.list_at(2)?,
            listen_port: u16::try_from(listen_port).unwrap_or(0),
            id: rlp.val_at(4)?,
        })
    }
}

// =============================================================================
// DISCONNECT
// =============================================================================

/// Encode a `Disconnect` payload: `[reason]`.
pub fn encode_disconnect(reason: DisconnectReason) -> Vec<u8> {
    let mut stream = RlpStream::new_list(1);
    stream.append(&reason.code());
    stream.out().to_vec()
}

/// Decode a `Disconnect` payload.
///
/// Accepts the list form, a bare reason and an empty payload (treated as
/// `Requested`), since implementations disagree on the encoding.
///
/// # Errors
///
/// Fails on malformed RLP or an unknown reason code.
pub fn decode_disconnect(payload: &[u8]) -> Result<DisconnectReason, DecoderError> {
    if payload.is_empty() {
        return Ok(DisconnectReason::Requested);
    }
    let rlp = Rlp::new(payload);
    let code: u8 = if rlp.is_list() {
        if rlp.item_count()? == 0 {
            return Ok(DisconnectReason::Requested);
        }
        rlp.val_at(0)?
    } else {
        rlp.as_val()?
    };
    DisconnectReason::try_from(code)
}
