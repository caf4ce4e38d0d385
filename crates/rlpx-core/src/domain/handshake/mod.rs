//! # Encryption Handshake
//!
//! Authenticated Diffie-Hellman key exchange (auth / auth-ack) that turns
//! two static identities into per-session `Secrets`.
//!
//! Reference: devp2p RLPx, EIP-8 (handshake packet framing)

// Semantic submodules
mod messages;
mod packet;
mod state;

// Re-export public API
pub use messages::{AuthAck, AuthMsg, HANDSHAKE_VERSION};
pub use packet::{declared_size, open, seal, PacketKind, MAX_PACKET_SIZE, PREFIX_LENGTH};
pub use state::EncryptionHandshake;
