//! # RLPx Transport Core
//!
//! Encrypted, authenticated and multiplexed peer sessions over TCP, as
//! spoken by devp2p nodes.
//!
//! ## Session Lifecycle
//!
//! ```text
//! TCP ─▶ encryption handshake ─▶ protocol handshake ─▶ capability negotiation ─▶ session
//!        (auth / auth-ack,        (Hello both ways)     (shared caps, offsets)    (Ping/Pong,
//!         ECIES, EIP-8)                                                            sub-protocols)
//! ```
//!
//! ## Architecture
//!
//! - **Domain Layer:** Pure session logic (handshake state, secrets, frame
//!   codec, base protocol messages, capability negotiation)
//! - **Ports Layer:** The [`Protocol`] trait implemented by sub-protocols
//! - **Transport Layer:** Handshake sequencing and framed I/O over tokio streams
//! - **Service Layer:** Peer sessions, dispatch, keepalive and the [`Server`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use rlpx_core::{Enode, RlpxConfig, Server};
//! use shared_crypto::Secp256k1KeyPair;
//! use std::sync::Arc;
//!
//! let server = Server::new(RlpxConfig::default(), Arc::new(Secp256k1KeyPair::generate()), vec![eth]);
//! server.bind("0.0.0.0:30303".parse()?).await?;
//! let peer = server.dial(&"enode://…@10.0.0.2:30303".parse::<Enode>()?).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod domain;
pub mod ports;
pub mod service;
pub mod transport;

/// Test utilities (in-memory connection pairs, recording protocol)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

// Domain
pub use domain::{
    Cap, CapabilityTable, DisconnectReason, Enode, EnodeParseError, Message, NegotiatedCapability,
    NodeId, ProtocolHandshake, ProtocolSpec,
};

// Errors
pub use domain::{AuthenticationError, HandshakeError, ProtocolError, RlpxError, TransportError};

// Ports
pub use ports::{BoxError, Protocol};

// Transport
pub use transport::{Connection, RlpxConfig};

// Service
pub use service::{Peer, PeerExit, PeerHandle, ProtocolContext, Server};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
