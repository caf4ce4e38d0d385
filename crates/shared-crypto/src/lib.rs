//! # Shared Crypto - secp256k1 and ECIES Primitives
//!
//! The asymmetric-crypto collaborator consumed by the RLPx transport core.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `keys` | secp256k1 | Static/ephemeral key pairs, ECDH, recoverable ECDSA |
//! | `hashing` | Keccak-256, SHA-256 | Secret derivation, MAC accumulators, KDF |
//! | `ecies` | ECDH + AES-128-CTR + HMAC-SHA256 | Handshake message envelopes |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, 65-byte recoverable signatures
//! - **ECIES**: fresh ephemeral key and IV per envelope, MAC verified in constant time
//! - Secret key material is erased on drop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecies;
pub mod errors;
pub mod hashing;
pub mod keys;

// Re-exports
pub use ecies::{decrypt, encrypt, ECIES_OVERHEAD};
pub use errors::CryptoError;
pub use hashing::{concat_kdf, keccak256, keccak256_concat, sha256, Keccak256Hasher};
pub use keys::{Secp256k1KeyPair, Secp256k1PublicKey, Secp256k1Signature};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
