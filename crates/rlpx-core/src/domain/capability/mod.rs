//! # Capability Negotiation
//!
//! Deterministic intersection of local and remote capabilities and the
//! assignment of disjoint wire-code ranges above the base protocol.
//!
//! Reference: devp2p RLPx "Message ID-based multiplexing"

// Semantic submodules
mod negotiation;
mod types;

// Re-export public API
pub use negotiation::CapabilityTable;
pub use types::{NegotiatedCapability, ProtocolSpec};

#[cfg(test)]
mod tests;
