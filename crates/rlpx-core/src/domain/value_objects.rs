//! Value objects shared by the handshake, framing and multiplexing layers.

use rand::RngCore;
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use shared_crypto::{CryptoError, Secp256k1PublicKey};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

// =============================================================================
// NODE IDENTITY
// =============================================================================

/// Stable peer identity: the 64-byte uncompressed static public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; 64]);

impl NodeId {
    /// Length in bytes.
    pub const LENGTH: usize = 64;

    /// Create from raw bytes.
    pub fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Create from a slice of exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 64] = bytes.try_into().ok()?;
        Some(Self(raw))
    }

    /// Parse 128 hex characters (an optional `0x` prefix is accepted).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        Self::from_slice(&bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Parse into a curve point.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidPublicKey` if the bytes are not a point.
    pub fn to_public_key(&self) -> Result<Secp256k1PublicKey, CryptoError> {
        Secp256k1PublicKey::from_bytes(self.0)
    }
}

impl From<Secp256k1PublicKey> for NodeId {
    fn from(key: Secp256k1PublicKey) -> Self {
        Self(*key.as_bytes())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

impl fmt::LowerHex for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Encodable for NodeId {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for NodeId {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        rlp.decoder().decode_value(|bytes| {
            Self::from_slice(bytes).ok_or(DecoderError::Custom("node id must be 64 bytes"))
        })
    }
}

// =============================================================================
// ENODE URL
// =============================================================================

/// Node address in `enode://<hex id>@<ip>:<port>` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Enode {
    /// Node identity
    pub id: NodeId,
    /// TCP endpoint
    pub addr: SocketAddr,
}

impl Enode {
    /// Create a new enode.
    pub fn new(id: NodeId, addr: SocketAddr) -> Self {
        Self { id, addr }
    }
}

/// Errors parsing an enode URL.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnodeParseError {
    /// Missing `enode://` scheme
    #[error("missing enode:// scheme")]
    MissingScheme,
    /// Missing `@` separator
    #[error("missing @ between id and address")]
    MissingSeparator,
    /// Id is not 128 hex characters
    #[error("invalid node id")]
    InvalidId,
    /// Address is not `ip:port`
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl FromStr for Enode {
    type Err = EnodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("enode://")
            .ok_or(EnodeParseError::MissingScheme)?;
        let (id, addr) = rest
            .split_once('@')
            .ok_or(EnodeParseError::MissingSeparator)?;
        // Discovery port query (`?discport=`) is irrelevant to RLPx
        let addr = addr.split('?').next().unwrap_or(addr);

        let id = NodeId::from_hex(id).ok_or(EnodeParseError::InvalidId)?;
        let addr = addr
            .parse()
            .map_err(|_| EnodeParseError::InvalidAddress(addr.to_string()))?;
        Ok(Self { id, addr })
    }
}

impl fmt::Display for Enode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "enode://{:x}@{}", self.id, self.addr)
    }
}

// =============================================================================
// NONCE
// =============================================================================

/// Handshake nonce: exactly 32 fresh random bytes per side per attempt.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Nonce([u8; 32]);

impl Nonce {
    /// Length in bytes.
    pub const LENGTH: usize = 32;

    /// Generate a fresh random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Byte-wise XOR with another 32-byte value.
    pub fn xor(&self, other: &[u8; 32]) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other[i];
        }
        out
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce({}…)", hex::encode(&self.0[..4]))
    }
}

impl Encodable for Nonce {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.0);
    }
}

impl Decodable for Nonce {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        rlp.decoder().decode_value(|bytes| {
            let raw: [u8; 32] = bytes
                .try_into()
                .map_err(|_| DecoderError::Custom("nonce must be 32 bytes"))?;
            Ok(Self(raw))
        })
    }
}

// =============================================================================
// CAPABILITY
// =============================================================================

/// Sub-protocol capability advertisement: `{name, version}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cap {
    /// Protocol name (e.g. `eth`)
    pub name: String,
    /// Protocol version
    pub version: u32,
}

impl Cap {
    /// Create a new capability.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

impl Encodable for Cap {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.name);
        s.append(&self.version);
    }
}

impl Decodable for Cap {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        Ok(Self {
            name: rlp.val_at(0)?,
            version: rlp.val_at(1)?,
        })
    }
}
