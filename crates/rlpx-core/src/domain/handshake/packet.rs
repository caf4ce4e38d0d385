//! Size-prefixed ECIES packets carrying handshake messages.
//!
//! ```text
//! size (u16 BE) ‖ ECIES(remote static key, rlp(msg) ‖ random padding, mac_data = size)
//! ```
//!
//! The returned/consumed byte strings are complete packets including the
//! prefix; they are exactly what the MAC accumulators are seeded with.

use crate::domain::errors::HandshakeError;
use rand::Rng;
use rlp::{Decodable, DecoderError, Encodable, Rlp};
use shared_crypto::{Secp256k1KeyPair, Secp256k1PublicKey, ECIES_OVERHEAD};

/// Length of the big-endian size prefix.
pub const PREFIX_LENGTH: usize = 2;

/// Largest accepted packet body.
pub const MAX_PACKET_SIZE: usize = 2048;

const MIN_PADDING: usize = 100;
const MAX_PADDING: usize = 250;

/// Which message a packet carries; selects the error variant on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Initiator auth
    Auth,
    /// Responder auth-ack
    AuthAck,
}

impl PacketKind {
    fn error(self, reason: String) -> HandshakeError {
        match self {
            Self::Auth => HandshakeError::MalformedAuth(reason),
            Self::AuthAck => HandshakeError::MalformedAck(reason),
        }
    }
}

/// Encode, pad and encrypt `msg` to `remote`.
///
/// # Errors
///
/// Returns `HandshakeError::Crypto` if `remote` is not a valid key.
pub fn seal<T: Encodable>(
    msg: &T,
    remote: &Secp256k1PublicKey,
) -> Result<Vec<u8>, HandshakeError> {
    let mut plaintext = rlp::encode(msg).to_vec();
    let mut rng = rand::thread_rng();
    let padding = rng.gen_range(MIN_PADDING..=MAX_PADDING);
    plaintext.extend((0..padding).map(|_| rng.gen::<u8>()));

    // Bodies stay below MAX_PACKET_SIZE: a few hundred bytes of RLP plus padding
    let prefix = ((plaintext.len() + ECIES_OVERHEAD) as u16).to_be_bytes();

    let envelope = shared_crypto::encrypt(remote, &plaintext, &prefix)?;

    let mut packet = Vec::with_capacity(PREFIX_LENGTH + envelope.len());
    packet.extend_from_slice(&prefix);
    packet.extend_from_slice(&envelope);
    Ok(packet)
}

/// Body length declared by a packet prefix.
///
/// # Errors
///
/// Rejects sizes that cannot hold an envelope or exceed `MAX_PACKET_SIZE`.
pub fn declared_size(prefix: [u8; PREFIX_LENGTH], kind: PacketKind) -> Result<usize, HandshakeError> {
    let size = usize::from(u16::from_be_bytes(prefix));
    if size > MAX_PACKET_SIZE {
        return Err(kind.error(format!("packet of {} bytes exceeds {}", size, MAX_PACKET_SIZE)));
    }
    if size < ECIES_OVERHEAD {
        return Err(kind.error(format!("packet of {} bytes cannot hold an envelope", size)));
    }
    Ok(size)
}

/// Decrypt and decode a complete packet addressed to `keypair`.
///
/// # Errors
///
/// Returns the kind's malformed-message error on a bad prefix, failed
/// decryption or undecodable body.
pub fn open<T: Decodable>(
    keypair: &Secp256k1KeyPair,
    packet: &[u8],
    kind: PacketKind,
) -> Result<T, HandshakeError> {
    if packet.len() < PREFIX_LENGTH {
        return Err(kind.error("missing size prefix".into()));
    }
    let (prefix, envelope) = packet.split_at(PREFIX_LENGTH);
    let size = declared_size([prefix[0], prefix[1]], kind)?;
    if envelope.len() != size {
        return Err(kind.error(format!(
            "declared {} bytes, received {}",
            size,
            envelope.len()
        )));
    }

    let plaintext = shared_crypto::decrypt(keypair, envelope, prefix)
        .map_err(|e| kind.error(e.to_string()))?;
    decode_padded(&plaintext).map_err(|e| kind.error(e.to_string()))
}

/// Decode the leading RLP item and ignore trailing padding.
pub fn decode_padded<T: Decodable>(bytes: &[u8]) -> Result<T, DecoderError> {
    let info = Rlp::new(bytes).payload_info()?;
    let end = info.header_len + info.value_len;
    if end > bytes.len() {
        return Err(DecoderError::RlpIsTooShort);
    }
    rlp::decode(&bytes[..end])
}
