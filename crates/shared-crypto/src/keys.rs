//! # secp256k1 Keys (ECDH + Recoverable ECDSA)
//!
//! Node identity and handshake keys on the secp256k1 curve.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Recoverable signatures (`r ‖ s ‖ v`, 65 bytes) so the signer's key
//!   never travels on the wire
//! - ECDH output is the x coordinate of the shared point only
//!
//! ## Use Cases
//!
//! - Static node identity (long-lived key pair)
//! - Ephemeral handshake keys (one per session, forward secrecy)

use crate::CryptoError;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;
use std::sync::OnceLock;

/// Length of an uncompressed public key with the `0x04` tag stripped.
pub const PUBLIC_KEY_LENGTH: usize = 64;

/// Length of a recoverable signature (`r ‖ s ‖ v`).
pub const SIGNATURE_LENGTH: usize = 65;

fn context() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// Uncompressed secp256k1 public key without the SEC1 tag (64 bytes, `x ‖ y`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secp256k1PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl Secp256k1PublicKey {
    /// Create from the 64 raw coordinate bytes, validating the point.
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LENGTH]) -> Result<Self, CryptoError> {
        let key = Self(bytes);
        key.to_secp()?;
        Ok(key)
    }

    /// Create from a slice holding either the 64 raw bytes or the
    /// 65-byte SEC1 uncompressed form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.len() {
            PUBLIC_KEY_LENGTH => {
                let mut raw = [0u8; PUBLIC_KEY_LENGTH];
                raw.copy_from_slice(bytes);
                Self::from_bytes(raw)
            }
            65 => {
                let key = PublicKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
                Ok(Self::from_secp(&key))
            }
            actual => Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_LENGTH,
                actual,
            }),
        }
    }

    /// Get raw coordinate bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    pub(crate) fn from_secp(key: &PublicKey) -> Self {
        let serialized = key.serialize_uncompressed();
        let mut raw = [0u8; PUBLIC_KEY_LENGTH];
        raw.copy_from_slice(&serialized[1..]);
        Self(raw)
    }

    pub(crate) fn to_secp(&self) -> Result<PublicKey, CryptoError> {
        let mut tagged = [0u8; PUBLIC_KEY_LENGTH + 1];
        tagged[0] = 0x04;
        tagged[1..].copy_from_slice(&self.0);
        PublicKey::from_slice(&tagged).map_err(|_| CryptoError::InvalidPublicKey)
    }
}

impl fmt::Debug for Secp256k1PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secp256k1PublicKey(")?;
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "…)")
    }
}

/// Recoverable ECDSA signature (65 bytes, `r ‖ s ‖ recovery id`).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Secp256k1Signature([u8; SIGNATURE_LENGTH]);

impl Secp256k1Signature {
    /// Create from bytes (65 bytes).
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Recover the signer's public key from a signature over a 32-byte digest.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidSignature` for a malformed signature and
    /// `CryptoError::RecoveryFailed` if no key recovers.
    pub fn recover(&self, digest: &[u8; 32]) -> Result<Secp256k1PublicKey, CryptoError> {
        let recovery_id = RecoveryId::from_i32(i32::from(self.0[64]))
            .map_err(|_| CryptoError::InvalidSignature)?;
        let signature = RecoverableSignature::from_compact(&self.0[..64], recovery_id)
            .map_err(|_| CryptoError::InvalidSignature)?;

        let key = context()
            .recover_ecdsa(&Message::from_digest(*digest), &signature)
            .map_err(|_| CryptoError::RecoveryFailed)?;
        Ok(Secp256k1PublicKey::from_secp(&key))
    }
}

impl fmt::Debug for Secp256k1Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secp256k1Signature(v={})", self.0[64])
    }
}

/// secp256k1 key pair.
pub struct Secp256k1KeyPair {
    secret: SecretKey,
    public: Secp256k1PublicKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let secret = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret(secret)
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = PublicKey::from_secret_key(context(), &secret);
        Self {
            secret,
            public: Secp256k1PublicKey::from_secp(&public),
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> Secp256k1PublicKey {
        self.public
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_recoverable(&self, digest: &[u8; 32]) -> Secp256k1Signature {
        let signature =
            context().sign_ecdsa_recoverable(&Message::from_digest(*digest), &self.secret);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&compact);
        // Recovery ids are always 0..=3
        bytes[64] = recovery_id.to_i32() as u8;
        Secp256k1Signature(bytes)
    }

    /// ECDH key agreement: x coordinate of `secret * remote`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidPublicKey` if `remote` is not on the curve.
    pub fn agree(&self, remote: &Secp256k1PublicKey) -> Result<[u8; 32], CryptoError> {
        let point = secp256k1::ecdh::shared_secret_point(&remote.to_secp()?, &self.secret);
        let mut x = [0u8; 32];
        x.copy_from_slice(&point[..32]);
        Ok(x)
    }

    /// Get secret key bytes (for serialization).
    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl fmt::Debug for Secp256k1KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secp256k1KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
