//! # Ports Layer
//!
//! Interfaces the transport core requires from the host application.
//!
//! - **Sub-protocols:** implementations of [`Protocol`] bound to negotiated
//!   capabilities. They see local message codes and payloads only, never
//!   encryption, framing or offsets.

pub mod protocol;

pub use protocol::{BoxError, Protocol};
