//! # Keccak-256 and SHA-256 Hashing
//!
//! Keccak-256 (the pre-standard SHA-3 padding used throughout Ethereum) drives
//! secret derivation and the running frame MAC state. SHA-256 backs the ECIES
//! key derivation function.

use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// 256-bit hash output.
pub type Hash = [u8; 32];

/// Stateful Keccak-256 hasher.
///
/// Cloning snapshots the running state, which lets callers read the digest
/// of everything absorbed so far without ending the stream.
#[derive(Clone, Default)]
pub struct Keccak256Hasher {
    inner: Keccak256,
}

impl Keccak256Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Keccak256::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Digest of all input so far; the hasher keeps accepting input.
    pub fn finalize(&self) -> Hash {
        self.inner.clone().finalize().into()
    }
}

/// Hash data with Keccak-256 (one-shot).
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Hash the concatenation of multiple inputs.
pub fn keccak256_concat(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256Hasher::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize()
}

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// NIST SP 800-56 concatenation KDF over SHA-256 with an empty `OtherInfo`.
pub fn concat_kdf(shared_secret: &[u8], length: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(length + 32);
    let mut counter: u32 = 1;
    while output.len() < length {
        let mut hasher = Sha256::new();
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_secret);
        output.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    output.truncate(length);
    output
}
