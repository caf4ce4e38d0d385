//! Per-attempt encryption handshake state machine.
//!
//! SECURITY-CRITICAL: derives every session key. Isolate for audits.
//!
//! ```text
//! initiator                                   responder
//!   auth_msg()          ── auth ──▶          handle_auth_msg()
//!   handle_auth_ack_msg() ◀── auth-ack ──    auth_ack_msg()
//!   extract_secrets(initiator = true)        extract_secrets(initiator = false)
//! ```

use super::messages::{AuthAck, AuthMsg, HANDSHAKE_VERSION};
use crate::domain::errors::HandshakeError;
use crate::domain::secrets::{MacAccumulator, Secrets};
use crate::domain::value_objects::{NodeId, Nonce};
use shared_crypto::{keccak256_concat, Secp256k1KeyPair, Secp256k1PublicKey};
use std::sync::Arc;
use zeroize::Zeroize;

/// State of one handshake attempt on one side.
pub struct EncryptionHandshake {
    static_key: Arc<Secp256k1KeyPair>,
    remote_static: Option<Secp256k1PublicKey>,
    ephemeral: Option<Secp256k1KeyPair>,
    initiator_nonce: Option<Nonce>,
    receiver_nonce: Option<Nonce>,
    remote_ephemeral: Option<Secp256k1PublicKey>,
}

impl EncryptionHandshake {
    /// Start an attempt. Supplying `remote_id` makes this side the initiator.
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError::SelfConnection` when `remote_id` is our own
    /// identity and `HandshakeError::Crypto` when it is not a curve point.
    pub fn new(
        static_key: Arc<Secp256k1KeyPair>,
        remote_id: Option<NodeId>,
    ) -> Result<Self, HandshakeError> {
        let remote_static = match remote_id {
            Some(id) => {
                if id == NodeId::from(static_key.public_key()) {
                    return Err(HandshakeError::SelfConnection);
                }
                Some(id.to_public_key()?)
            }
            None => None,
        };

        Ok(Self {
            static_key,
            remote_static,
            ephemeral: None,
            initiator_nonce: None,
            receiver_nonce: None,
            remote_ephemeral: None,
        })
    }

    /// Remote static identity, once known.
    pub fn remote_id(&self) -> Option<NodeId> {
        self.remote_static.map(NodeId::from)
    }

    /// Remote static public key, once known.
    pub fn remote_public_key(&self) -> Option<&Secp256k1PublicKey> {
        self.remote_static.as_ref()
    }

    fn ephemeral(&mut self) -> &Secp256k1KeyPair {
        self.ephemeral.get_or_insert_with(Secp256k1KeyPair::generate)
    }

    /// Build the initiator's auth message.
    ///
    /// # Errors
    ///
    /// Fails if this side has no remote identity (it is the responder).
    pub fn auth_msg(&mut self) -> Result<AuthMsg, HandshakeError> {
        let remote = self
            .remote_static
            .ok_or(HandshakeError::MissingState("remote identity"))?;
        let nonce = Nonce::generate();

        let mut static_shared = self.static_key.agree(&remote)?;
        let mut signed = nonce.xor(&static_shared);
        let signature = self.ephemeral().sign_recoverable(&signed);
        static_shared.zeroize();
        signed.zeroize();

        self.initiator_nonce = Some(nonce);
        Ok(AuthMsg {
            signature,
            initiator_pubkey: self.static_key.public_key(),
            nonce,
            version: HANDSHAKE_VERSION,
        })
    }

    /// Absorb the initiator's auth message (responder side).
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError::UnsupportedVersion` for versions other than 4,
    /// `HandshakeError::SelfConnection` if the initiator is us, and
    /// `HandshakeError::SignatureRecovery` if the ephemeral key cannot be
    /// recovered.
    pub fn handle_auth_msg(&mut self, msg: &AuthMsg) -> Result<(), HandshakeError> {
        if msg.version != HANDSHAKE_VERSION {
            return Err(HandshakeError::UnsupportedVersion(msg.version));
        }
        if msg.initiator_pubkey == self.static_key.public_key() {
            return Err(HandshakeError::SelfConnection);
        }

        let mut static_shared = self.static_key.agree(&msg.initiator_pubkey)?;
        let mut signed = msg.nonce.xor(&static_shared);
        let recovered = msg.signature.recover(&signed);
        static_shared.zeroize();
        signed.zeroize();

        self.remote_ephemeral = Some(recovered.map_err(HandshakeError::SignatureRecovery)?);
        self.remote_static = Some(msg.initiator_pubkey);
        self.initiator_nonce = Some(msg.nonce);
        Ok(())
    }

    /// Build the responder's auth-ack message.
    pub fn auth_ack_msg(&mut self) -> AuthAck {
        let nonce = Nonce::generate();
        self.receiver_nonce = Some(nonce);
        AuthAck {
            ephemeral_pubkey: self.ephemeral().public_key(),
            nonce,
            version: HANDSHAKE_VERSION,
        }
    }

    /// Absorb the responder's auth-ack (initiator side).
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError::UnsupportedVersion` for versions other than 4.
    pub fn handle_auth_ack_msg(&mut self, msg: &AuthAck) -> Result<(), HandshakeError> {
        if msg.version != HANDSHAKE_VERSION {
            return Err(HandshakeError::UnsupportedVersion(msg.version));
        }
        self.receiver_nonce = Some(msg.nonce);
        self.remote_ephemeral = Some(msg.ephemeral_pubkey);
        Ok(())
    }

    /// Derive session secrets from both complete handshake packets.
    ///
    /// ```text
    /// ephemeral = ECDH(own ephemeral, remote ephemeral)
    /// shared    = H(ephemeral ‖ H(receiver_nonce ‖ initiator_nonce))
    /// aes_key   = H(ephemeral ‖ shared)
    /// mac_key   = H(ephemeral ‖ aes_key)
    /// mac_A     = H(mac_key ^ receiver_nonce ‖ auth)       initiator egress
    /// mac_B     = H(mac_key ^ initiator_nonce ‖ auth_ack)  initiator ingress
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `HandshakeError::MissingState` if a message has not been
    /// exchanged yet.
    pub fn extract_secrets(
        &self,
        auth_bytes: &[u8],
        auth_ack_bytes: &[u8],
        initiator: bool,
    ) -> Result<Secrets, HandshakeError> {
        let ephemeral = self
            .ephemeral
            .as_ref()
            .ok_or(HandshakeError::MissingState("own ephemeral key"))?;
        let remote_ephemeral = self
            .remote_ephemeral
            .as_ref()
            .ok_or(HandshakeError::MissingState("remote ephemeral key"))?;
        let remote_static = self
            .remote_static
            .ok_or(HandshakeError::MissingState("remote identity"))?;
        let initiator_nonce = self
            .initiator_nonce
            .ok_or(HandshakeError::MissingState("initiator nonce"))?;
        let receiver_nonce = self
            .receiver_nonce
            .ok_or(HandshakeError::MissingState("receiver nonce"))?;

        let mut ephemeral_secret = ephemeral.agree(remote_ephemeral)?;
        let nonce_hash =
            keccak256_concat(&[receiver_nonce.as_bytes(), initiator_nonce.as_bytes()]);
        let mut shared = keccak256_concat(&[&ephemeral_secret, &nonce_hash]);
        let aes_key = keccak256_concat(&[&ephemeral_secret, &shared]);
        let mac_key = keccak256_concat(&[&ephemeral_secret, &aes_key]);
        ephemeral_secret.zeroize();
        shared.zeroize();

        let mac_a = MacAccumulator::new(&mac_key, &receiver_nonce, auth_bytes);
        let mac_b = MacAccumulator::new(&mac_key, &initiator_nonce, auth_ack_bytes);
        let (egress_mac, ingress_mac) = if initiator {
            (mac_a, mac_b)
        } else {
            (mac_b, mac_a)
        };

        Ok(Secrets::new(
            NodeId::from(remote_static),
            aes_key,
            mac_key,
            egress_mac,
            ingress_mac,
        ))
    }
}

impl std::fmt::Debug for EncryptionHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionHandshake")
            .field("remote", &self.remote_id())
            .field("initiator_nonce", &self.initiator_nonce.is_some())
            .field("receiver_nonce", &self.receiver_nonce.is_some())
            .finish_non_exhaustive()
    }
}
