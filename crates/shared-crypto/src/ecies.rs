//! # ECIES Envelope
//!
//! Asymmetric encryption addressed to a secp256k1 public key, used only for
//! the two handshake messages.
//!
//! ## Wire Layout
//!
//! ```text
//! 0x04 ‖ R (64) ‖ iv (16) ‖ AES-128-CTR(ke, iv, m) ‖ HMAC-SHA256(km, iv ‖ c ‖ mac_data) (32)
//! ```
//!
//! `ke ‖ km'` come from the concatenation KDF over the ECDH secret between
//! the fresh ephemeral key `R` and the recipient; `km = sha256(km')`.

use crate::hashing::{concat_kdf, sha256};
use crate::keys::{Secp256k1KeyPair, Secp256k1PublicKey, PUBLIC_KEY_LENGTH};
use crate::CryptoError;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const IV_LENGTH: usize = 16;
const TAG_LENGTH: usize = 32;
const TAGGED_KEY_LENGTH: usize = PUBLIC_KEY_LENGTH + 1;

/// Bytes an envelope adds on top of the plaintext.
pub const ECIES_OVERHEAD: usize = TAGGED_KEY_LENGTH + IV_LENGTH + TAG_LENGTH;

/// Per-envelope symmetric keys.
#[derive(Zeroize)]
#[zeroize(drop)]
struct EnvelopeKeys {
    encryption: [u8; 16],
    authentication: [u8; 32],
}

impl EnvelopeKeys {
    fn derive(shared_secret: &[u8; 32]) -> Self {
        let mut material = concat_kdf(shared_secret, 32);
        let mut encryption = [0u8; 16];
        encryption.copy_from_slice(&material[..16]);
        let authentication = sha256(&material[16..]);
        material.zeroize();
        Self {
            encryption,
            authentication,
        }
    }

    fn apply_keystream(&self, iv: &[u8], data: &mut [u8]) -> Result<(), CryptoError> {
        let mut cipher = Aes128Ctr::new_from_slices(&self.encryption, iv)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        cipher.apply_keystream(data);
        Ok(())
    }

    fn mac(&self, iv: &[u8], ciphertext: &[u8], mac_data: &[u8]) -> Result<HmacSha256, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.authentication)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        mac.update(iv);
        mac.update(ciphertext);
        mac.update(mac_data);
        Ok(mac)
    }
}

/// Encrypt `plaintext` to `remote`, authenticating `mac_data` alongside.
///
/// # Errors
///
/// Returns `CryptoError::InvalidPublicKey` if `remote` is not a curve point.
pub fn encrypt(
    remote: &Secp256k1PublicKey,
    plaintext: &[u8],
    mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = Secp256k1KeyPair::generate();
    let mut shared = ephemeral.agree(remote)?;
    let keys = EnvelopeKeys::derive(&shared);
    shared.zeroize();

    let mut iv = [0u8; IV_LENGTH];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut ciphertext = plaintext.to_vec();
    keys.apply_keystream(&iv, &mut ciphertext)?;
    let tag = keys.mac(&iv, &ciphertext, mac_data)?.finalize().into_bytes();

    let mut envelope = Vec::with_capacity(ECIES_OVERHEAD + plaintext.len());
    envelope.push(0x04);
    envelope.extend_from_slice(ephemeral.public_key().as_bytes());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    envelope.extend_from_slice(&tag);
    Ok(envelope)
}

/// Decrypt an envelope addressed to `keypair`.
///
/// # Errors
///
/// Returns `CryptoError::DecryptionFailed` if the envelope is truncated or
/// its MAC does not verify, and `CryptoError::InvalidPublicKey` if the
/// embedded ephemeral key is not a curve point.
pub fn decrypt(
    keypair: &Secp256k1KeyPair,
    envelope: &[u8],
    mac_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < ECIES_OVERHEAD {
        return Err(CryptoError::DecryptionFailed(format!(
            "envelope too short: {} bytes",
            envelope.len()
        )));
    }
    if envelope[0] != 0x04 {
        return Err(CryptoError::InvalidPublicKey);
    }

    let ephemeral = Secp256k1PublicKey::from_slice(&envelope[1..TAGGED_KEY_LENGTH])?;
    let iv = &envelope[TAGGED_KEY_LENGTH..TAGGED_KEY_LENGTH + IV_LENGTH];
    let body_end = envelope.len() - TAG_LENGTH;
    let ciphertext = &envelope[TAGGED_KEY_LENGTH + IV_LENGTH..body_end];
    let tag = &envelope[body_end..];

    let mut shared = keypair.agree(&ephemeral)?;
    let keys = EnvelopeKeys::derive(&shared);
    shared.zeroize();

    keys.mac(iv, ciphertext, mac_data)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::DecryptionFailed("MAC mismatch".into()))?;

    let mut plaintext = ciphertext.to_vec();
    keys.apply_keystream(iv, &mut plaintext)?;
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let recipient = Secp256k1KeyPair::generate();
        let plaintext = b"auth message body";

        let envelope = encrypt(&recipient.public_key(), plaintext, b"\x01\x02").unwrap();
        assert_eq!(envelope.len(), plaintext.len() + ECIES_OVERHEAD);

        let decrypted = decrypt(&recipient, &envelope, b"\x01\x02").unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let recipient = Secp256k1KeyPair::generate();
        let eavesdropper = Secp256k1KeyPair::generate();

        let envelope = encrypt(&recipient.public_key(), b"secret", &[]).unwrap();
        let result = decrypt(&eavesdropper, &envelope, &[]);

        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_mac_data_is_authenticated() {
        let recipient = Secp256k1KeyPair::generate();

        let envelope = encrypt(&recipient.public_key(), b"secret", b"\x00\x10").unwrap();
        let result = decrypt(&recipient, &envelope, b"\x00\x11");

        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let recipient = Secp256k1KeyPair::generate();

        let mut envelope = encrypt(&recipient.public_key(), b"secret message", &[]).unwrap();
        envelope[TAGGED_KEY_LENGTH + IV_LENGTH] ^= 0xFF;

        let result = decrypt(&recipient, &envelope, &[]);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_truncated_envelope_fails() {
        let recipient = Secp256k1KeyPair::generate();
        let result = decrypt(&recipient, &[0x04; ECIES_OVERHEAD - 1], &[]);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn test_empty_plaintext() {
        let recipient = Secp256k1KeyPair::generate();
        let envelope = encrypt(&recipient.public_key(), &[], &[]).unwrap();
        assert_eq!(decrypt(&recipient, &envelope, &[]).unwrap(), Vec::<u8>::new());
    }
}
