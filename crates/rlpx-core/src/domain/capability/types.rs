//! Capability declarations and negotiated bindings.

use crate::domain::value_objects::Cap;
use std::fmt;
use std::ops::Range;

/// What a local sub-protocol implementation declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolSpec {
    /// Capability name
    pub name: String,
    /// Capability version
    pub version: u32,
    /// Size of its message-code space
    pub length: u64,
}

impl ProtocolSpec {
    /// Create a new declaration.
    pub fn new(name: impl Into<String>, version: u32, length: u64) -> Self {
        Self {
            name: name.into(),
            version,
            length,
        }
    }

    /// Advertised form.
    pub fn cap(&self) -> Cap {
        Cap::new(self.name.clone(), self.version)
    }
}

/// A capability both sides speak, with its assigned wire-code range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedCapability {
    /// Capability name
    pub name: String,
    /// Highest version shared by both sides
    pub version: u32,
    /// First wire code of the range
    pub offset: u64,
    /// Number of codes in the range
    pub length: u64,
    /// Index of the local protocol implementation bound to this range
    pub protocol_index: usize,
}

impl NegotiatedCapability {
    /// Wire codes owned by this capability.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.length
    }

    /// Whether `code` falls in this capability's range.
    pub fn contains(&self, code: u64) -> bool {
        self.range().contains(&code)
    }

    /// Advertised form.
    pub fn cap(&self) -> Cap {
        Cap::new(self.name.clone(), self.version)
    }
}

impl fmt::Display for NegotiatedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}..{}",
            self.name,
            self.version,
            self.offset,
            self.offset + self.length
        )
    }
}
