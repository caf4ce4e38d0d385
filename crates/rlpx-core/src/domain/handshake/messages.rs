//! Auth and auth-ack message bodies.
//!
//! Both are RLP lists. Decoders read the leading fields they know and ignore
//! any trailing list elements a newer peer may append.

use crate::domain::value_objects::Nonce;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use shared_crypto::{Secp256k1PublicKey, Secp256k1Signature};

/// The only handshake version this implementation speaks.
pub const HANDSHAKE_VERSION: u8 = 4;

/// Initiator's first message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMsg {
    /// Ephemeral-key signature over `ECDH(static keys) XOR nonce`
    pub signature: Secp256k1Signature,
    /// Initiator's static public key
    pub initiator_pubkey: Secp256k1PublicKey,
    /// Initiator nonce
    pub nonce: Nonce,
    /// Declared handshake version
    pub version: u8,
}

/// Responder's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAck {
    /// Responder's ephemeral public key
    pub ephemeral_pubkey: Secp256k1PublicKey,
    /// Responder nonce
    pub nonce: Nonce,
    /// Declared handshake version
    pub version: u8,
}

impl Encodable for AuthMsg {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.signature.as_bytes().to_vec());
        s.append(&self.initiator_pubkey.as_bytes().to_vec());
        s.append(&self.nonce);
        s.append(&self.version);
    }
}

impl Decodable for AuthMsg {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        let signature: Vec<u8> = rlp.val_at(0)?;
        let signature: [u8; 65] = signature
            .as_slice()
            .try_into()
            .map_err(|_| DecoderError::Custom("signature must be 65 bytes"))?;
        let pubkey: Vec<u8> = rlp.val_at(1)?;

        Ok(Self {
            signature: Secp256k1Signature::from_bytes(signature),
            initiator_pubkey: decode_public_key(&pubkey)?,
            nonce: rlp.val_at(2)?,
            version: rlp.val_at(3)?,
        })
    }
}

impl Encodable for AuthAck {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.ephemeral_pubkey.as_bytes().to_vec());
        s.append(&self.nonce);
        s.append(&self.version);
    }
}

impl Decodable for AuthAck {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        let pubkey: Vec<u8> = rlp.val_at(0)?;

        Ok(Self {
            ephemeral_pubkey: decode_public_key(&pubkey)?,
            nonce: rlp.val_at(1)?,
            version: rlp.val_at(2)?,
        })
    }
}

fn decode_public_key(bytes: &[u8]) -> Result<Secp256k1PublicKey, DecoderError> {
    if bytes.len() != 64 {
        return Err(DecoderError::Custom("public key must be 64 bytes"));
    }
    Secp256k1PublicKey::from_slice(bytes).map_err(|_| DecoderError::Custom("invalid public key"))
}
