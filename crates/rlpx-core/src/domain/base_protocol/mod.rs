//! # Base Protocol
//!
//! Control messages occupying wire codes 0-15 on every session. They are
//! handled by the peer itself and never forwarded to sub-protocols.
//!
//! Reference: devp2p RLPx "p2p" capability

// Semantic submodules
mod messages;
mod reason;

// Re-export public API
pub use messages::{
    decode_disconnect, encode_disconnect, ProtocolHandshake, BASE_PROTOCOL_LENGTH,
    BASE_PROTOCOL_VERSION, DISCONNECT, EMPTY_LIST, HELLO, MAX_HELLO_SIZE, PING, PONG,
};
pub use reason::DisconnectReason;
