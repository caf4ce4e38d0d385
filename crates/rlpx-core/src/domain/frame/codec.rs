//! Frame encoder/decoder pair.
//!
//! SECURITY-CRITICAL: every frame advances the MAC accumulators and the
//! AES-CTR keystreams. A frame that fails verification leaves the ingress
//! side permanently out of step with the remote, so the decoder refuses
//! all further input once it has seen one.

use super::message::Message;
use crate::domain::errors::{AuthenticationError, ProtocolError, RlpxError, TransportError};
use crate::domain::secrets::{MacAccumulator, Secrets, MAC_LENGTH};
use aes::cipher::generic_array::GenericArray;
use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rlp::Rlp;
use subtle::ConstantTimeEq;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Cipher block size; headers and bodies are padded to it.
pub const BLOCK_SIZE: usize = 16;

/// Encrypted header plus its tag.
pub const FRAME_HEADER_SIZE: usize = BLOCK_SIZE + MAC_LENGTH;

/// Largest body a 3-byte header size field can declare.
pub const MAX_FRAME_SIZE: usize = 0xFF_FFFF;

/// Header-data: RLP `[capability-id = 0, context-id = 0]`.
const HEADER_DATA: [u8; 3] = [0xc2, 0x80, 0x80];

fn frame_cipher(aes_key: &[u8; 32]) -> Aes256Ctr {
    // Each direction gets its own instance; both start at a zero IV
    Aes256Ctr::new(
        GenericArray::from_slice(aes_key),
        &GenericArray::default(),
    )
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

// =============================================================================
// CODEC
// =============================================================================

/// Both directions of one session's framing.
pub struct FrameCodec {
    encoder: FrameEncoder,
    decoder: FrameDecoder,
}

impl FrameCodec {
    /// Build a codec, consuming the session secrets.
    ///
    /// `max_frame_size` is clamped to what the header can express.
    pub fn new(secrets: Secrets, max_frame_size: usize) -> Self {
        let max_frame_size = max_frame_size.min(MAX_FRAME_SIZE);
        Self {
            encoder: FrameEncoder {
                cipher: frame_cipher(secrets.aes_key()),
                mac: secrets.egress_mac().clone(),
                max_frame_size,
            },
            decoder: FrameDecoder {
                cipher: frame_cipher(secrets.aes_key()),
                mac: secrets.ingress_mac().clone(),
                max_frame_size,
                pending: None,
                poisoned: false,
            },
        }
    }

    /// Split into independently owned halves for a reader and a writer task.
    pub fn split(self) -> (FrameEncoder, FrameDecoder) {
        (self.encoder, self.decoder)
    }

    /// See [`FrameEncoder::encode_frame`].
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::FrameTooLarge` for oversized bodies.
    pub fn encode_frame(&mut self, code: u64, payload: &[u8]) -> Result<Vec<u8>, RlpxError> {
        self.encoder.encode_frame(code, payload)
    }

    /// See [`FrameDecoder::decode_header`].
    ///
    /// # Errors
    ///
    /// Fails on a tag mismatch, a poisoned decoder or an oversized frame.
    pub fn decode_header(&mut self, header: &[u8; FRAME_HEADER_SIZE]) -> Result<usize, RlpxError> {
        self.decoder.decode_header(header)
    }

    /// See [`FrameDecoder::decode_body`].
    ///
    /// # Errors
    ///
    /// Fails on a tag mismatch, a poisoned decoder or a malformed body.
    pub fn decode_body(&mut self, body: &[u8]) -> Result<Message, RlpxError> {
        self.decoder.decode_body(body)
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ENCODER
// =============================================================================

/// Egress half: egress keystream plus egress MAC.
pub struct FrameEncoder {
    cipher: Aes256Ctr,
    mac: MacAccumulator,
    max_frame_size: usize,
}

impl FrameEncoder {
    /// Encrypt and authenticate one message into a complete wire frame.
    ///
    /// The body is `rlp(code) ‖ payload`; the header declares its length.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::FrameTooLarge` if the body exceeds the limit.
    /// Nothing is absorbed into the MAC in that case.
    pub fn encode_frame(&mut self, code: u64, payload: &[u8]) -> Result<Vec<u8>, RlpxError> {
        let code_rlp = rlp::encode(&code);
        let size = code_rlp.len() + payload.len();
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            }
            .into());
        }

        let body_len = padded_len(size);
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body_len + MAC_LENGTH);

        let mut header = [0u8; BLOCK_SIZE];
        // Truncation is safe: size <= MAX_FRAME_SIZE fits in 24 bits
        header[..3].copy_from_slice(&(size as u32).to_be_bytes()[1..]);
        header[3..6].copy_from_slice(&HEADER_DATA);
        self.cipher.apply_keystream(&mut header);
        let header_tag = self.mac.update_header(&header);
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&header_tag);

        let body_start = frame.len();
        frame.extend_from_slice(&code_rlp);
        frame.extend_from_slice(payload);
        frame.resize(body_start + body_len, 0);
        self.cipher.apply_keystream(&mut frame[body_start..]);
        let body_tag = self.mac.update_body(&frame[body_start..]);
        frame.extend_from_slice(&body_tag);

        Ok(frame)
    }
}

// =============================================================================
// DECODER
// =============================================================================

/// Ingress half: ingress keystream plus ingress MAC.
pub struct FrameDecoder {
    cipher: Aes256Ctr,
    mac: MacAccumulator,
    max_frame_size: usize,
    pending: Option<usize>,
    poisoned: bool,
}

impl FrameDecoder {
    /// Verify and decrypt a frame header.
    ///
    /// Returns how many more bytes (padded body plus tag) make up the frame.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError::HeaderMacMismatch` on a bad tag,
    /// `AuthenticationError::Desynchronized` after any earlier failure, and
    /// `ProtocolError::FrameTooLarge` if the declared size exceeds the limit.
    pub fn decode_header(&mut self, header: &[u8; FRAME_HEADER_SIZE]) -> Result<usize, RlpxError> {
        self.ensure_synchronized()?;

        let (ciphertext, tag) = header.split_at(BLOCK_SIZE);
        let expected = self.mac.update_header(ciphertext);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            self.poisoned = true;
            return Err(AuthenticationError::HeaderMacMismatch.into());
        }

        let mut plaintext = [0u8; BLOCK_SIZE];
        plaintext.copy_from_slice(ciphertext);
        self.cipher.apply_keystream(&mut plaintext);
        let size = usize::from(plaintext[0]) << 16
            | usize::from(plaintext[1]) << 8
            | usize::from(plaintext[2]);

        if size > self.max_frame_size {
            self.poisoned = true;
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            }
            .into());
        }

        self.pending = Some(size);
        Ok(padded_len(size) + MAC_LENGTH)
    }

    /// Swap in a new frame size limit and return the previous one.
    pub fn replace_max_frame_size(&mut self, limit: usize) -> usize {
        std::mem::replace(&mut self.max_frame_size, limit.min(MAX_FRAME_SIZE))
    }

    /// Verify and decrypt the body that follows a decoded header.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError::BodyMacMismatch` on a bad tag,
    /// `AuthenticationError::Desynchronized` after any earlier failure,
    /// `TransportError::NotReady` without a preceding header, and
    /// `ProtocolError::Decode` if the body does not start with a code.
    pub fn decode_body(&mut self, body: &[u8]) -> Result<Message, RlpxError> {
        self.ensure_synchronized()?;
        let size = self
            .pending
            .take()
            .ok_or(TransportError::NotReady("frame header not decoded"))?;
        if body.len() != padded_len(size) + MAC_LENGTH {
            self.poisoned = true;
            return Err(ProtocolError::Decode(format!(
                "frame body of {} bytes, header declared {}",
                body.len(),
                size
            ))
            .into());
        }

        let (ciphertext, tag) = body.split_at(body.len() - MAC_LENGTH);
        let expected = self.mac.update_body(ciphertext);
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            self.poisoned = true;
            return Err(AuthenticationError::BodyMacMismatch.into());
        }

        let mut plaintext = ciphertext.to_vec();
        self.cipher.apply_keystream(&mut plaintext);
        plaintext.truncate(size);

        let (code, code_len) = decode_code(&plaintext)?;
        plaintext.drain(..code_len);
        Ok(Message::new(code, plaintext, size))
    }

    /// True once a frame has failed; the decoder is then unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn ensure_synchronized(&self) -> Result<(), AuthenticationError> {
        if self.poisoned {
            Err(AuthenticationError::Desynchronized)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("max_frame_size", &self.max_frame_size)
            .field("pending", &self.pending)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

/// Leading RLP integer of a body and its encoded length.
fn decode_code(plaintext: &[u8]) -> Result<(u64, usize), ProtocolError> {
    let rlp = Rlp::new(plaintext);
    let info = rlp.payload_info()?;
    let code_len = info.header_len + info.value_len;
    if code_len > plaintext.len() {
        return Err(ProtocolError::Decode("truncated message code".into()));
    }
    let code = Rlp::new(&plaintext[..code_len]).as_val()?;
    Ok((code, code_len))
}
