//! Domain Layer - Pure session logic with no I/O
//!
//! This module contains the cryptographic and protocol core of RLPx:
//! - Node identity, nonces and capability advertisements
//! - Encryption handshake (auth / auth-ack, EIP-8 packets)
//! - Session secrets and the chained MAC accumulators
//! - Frame codec (AES-256-CTR + keccak MAC)
//! - Base protocol messages (Hello, Disconnect, Ping, Pong)
//! - Capability negotiation and wire-code offsets

pub mod base_protocol;
pub mod capability;
pub mod errors;
pub mod frame;
pub mod handshake;
pub mod secrets;
pub mod value_objects;

pub use base_protocol::*;
pub use capability::*;
pub use errors::*;
pub use frame::*;
pub use handshake::*;
pub use secrets::*;
pub use value_objects::*;
