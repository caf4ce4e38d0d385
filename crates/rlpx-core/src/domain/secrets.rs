//! Session secrets and the running MAC accumulators.
//!
//! `Secrets` is created once by the encryption handshake and moved into the
//! frame codec, which owns it for the rest of the session. The two
//! accumulators are never shared between tasks: the egress half travels with
//! the frame writer and the ingress half with the frame reader.

use super::value_objects::{NodeId, Nonce};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use shared_crypto::Keccak256Hasher;
use zeroize::Zeroize;

/// Length of a frame tag.
pub const MAC_LENGTH: usize = 16;

/// Running keccak-256 state that derives per-frame authentication tags.
///
/// Each tag depends on every byte the accumulator has absorbed since the
/// handshake, so a single skipped or altered frame desynchronizes the two
/// endpoints permanently.
#[derive(Clone)]
pub struct MacAccumulator {
    hasher: Keccak256Hasher,
    cipher: Aes256,
}

impl MacAccumulator {
    /// Seed with `mac_key XOR nonce` followed by the handshake packet.
    pub fn new(mac_key: &[u8; 32], nonce: &Nonce, transcript: &[u8]) -> Self {
        let mut hasher = Keccak256Hasher::new();
        hasher.update(&nonce.xor(mac_key));
        hasher.update(transcript);
        Self {
            hasher,
            cipher: Aes256::new(GenericArray::from_slice(mac_key)),
        }
    }

    /// Absorb raw bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Current 32-byte digest.
    pub fn digest(&self) -> [u8; 32] {
        self.hasher.finalize()
    }

    /// Absorb an encrypted header block and return its tag.
    pub fn update_header(&mut self, header_ciphertext: &[u8]) -> [u8; MAC_LENGTH] {
        let mut seed = self.encrypted_digest();
        for (byte, ct) in seed.iter_mut().zip(header_ciphertext) {
            *byte ^= ct;
        }
        self.hasher.update(&seed);
        self.tag()
    }

    /// Absorb an encrypted frame body and return its tag.
    pub fn update_body(&mut self, body_ciphertext: &[u8]) -> [u8; MAC_LENGTH] {
        self.hasher.update(body_ciphertext);
        let previous = self.tag();
        let mut seed = self.encrypted_digest();
        for (byte, prev) in seed.iter_mut().zip(previous.iter()) {
            *byte ^= prev;
        }
        self.hasher.update(&seed);
        self.tag()
    }

    fn encrypted_digest(&self) -> [u8; MAC_LENGTH] {
        let mut block = GenericArray::clone_from_slice(&self.digest()[..MAC_LENGTH]);
        self.cipher.encrypt_block(&mut block);
        block.into()
    }

    fn tag(&self) -> [u8; MAC_LENGTH] {
        let mut tag = [0u8; MAC_LENGTH];
        tag.copy_from_slice(&self.digest()[..MAC_LENGTH]);
        tag
    }
}

/// Symmetric session state derived from one encryption handshake.
pub struct Secrets {
    /// Identity proven by the remote during the handshake
    pub remote_id: NodeId,
    pub(crate) aes_key: [u8; 32],
    pub(crate) mac_key: [u8; 32],
    pub(crate) egress_mac: MacAccumulator,
    pub(crate) ingress_mac: MacAccumulator,
}

impl Secrets {
    /// Assemble secrets from derived keys and seeded accumulators.
    pub fn new(
        remote_id: NodeId,
        aes_key: [u8; 32],
        mac_key: [u8; 32],
        egress_mac: MacAccumulator,
        ingress_mac: MacAccumulator,
    ) -> Self {
        Self {
            remote_id,
            aes_key,
            mac_key,
            egress_mac,
            ingress_mac,
        }
    }

    /// Frame cipher key.
    pub fn aes_key(&self) -> &[u8; 32] {
        &self.aes_key
    }

    /// Frame MAC key.
    pub fn mac_key(&self) -> &[u8; 32] {
        &self.mac_key
    }

    /// Outbound accumulator.
    pub fn egress_mac(&self) -> &MacAccumulator {
        &self.egress_mac
    }

    /// Inbound accumulator.
    pub fn ingress_mac(&self) -> &MacAccumulator {
        &self.ingress_mac
    }
}

impl Drop for Secrets {
    fn drop(&mut self) {
        self.aes_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("remote_id", &self.remote_id)
            .finish_non_exhaustive()
    }
}
