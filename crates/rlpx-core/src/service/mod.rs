//! # Service Layer
//!
//! Runs established connections as multiplexed peer sessions and manages
//! the set of sessions for a node.
//!
//! - [`Peer`] - One session: read loop, protocol bindings, keepalive
//! - [`PeerHandle`] - Cloneable control handle for a running session
//! - [`ProtocolContext`] - A sub-protocol's offset-scoped I/O handle
//! - [`Server`] - Listener, dialer and session registry

mod context;
mod peer;
mod server;

pub use context::ProtocolContext;
pub use peer::{Peer, PeerExit, PeerHandle};
pub use server::Server;
