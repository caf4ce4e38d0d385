//! Negotiation algorithm.
//!
//! Both endpoints run this independently over publicly exchanged data and
//! must arrive at byte-identical offset tables:
//!
//! 1. keep local declarations whose `(name, version)` the remote advertises
//! 2. per name, keep the highest shared version
//! 3. order by name
//! 4. assign offsets from `BASE_PROTOCOL_LENGTH`, each range following the
//!    previous one
//!
//! Local protocols with no shared capability get no range.

use super::types::{NegotiatedCapability, ProtocolSpec};
use crate::domain::base_protocol::BASE_PROTOCOL_LENGTH;
use crate::domain::value_objects::Cap;
use std::collections::{BTreeMap, HashSet};

/// Read-only wire-code table for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTable {
    entries: Vec<NegotiatedCapability>,
}

impl CapabilityTable {
    /// Negotiate `local` declarations against the `remote` advertisement.
    pub fn negotiate(local: &[ProtocolSpec], remote: &[Cap]) -> Self {
        let remote: HashSet<(&str, u32)> = remote
            .iter()
            .map(|cap| (cap.name.as_str(), cap.version))
            .collect();

        // BTreeMap iteration order is the required name ordering
        let mut best: BTreeMap<&str, (usize, &ProtocolSpec)> = BTreeMap::new();
        for (index, spec) in local.iter().enumerate() {
            if !remote.contains(&(spec.name.as_str(), spec.version)) {
                continue;
            }
            match best.get(spec.name.as_str()) {
                Some((_, current)) if current.version >= spec.version => {}
                _ => {
                    best.insert(spec.name.as_str(), (index, spec));
                }
            }
        }

        let mut offset = BASE_PROTOCOL_LENGTH;
        let entries = best
            .into_values()
            .map(|(protocol_index, spec)| {
                let entry = NegotiatedCapability {
                    name: spec.name.clone(),
                    version: spec.version,
                    offset,
                    length: spec.length,
                    protocol_index,
                };
                offset += spec.length;
                entry
            })
            .collect();

        Self { entries }
    }

    /// Negotiated capabilities in offset order.
    pub fn entries(&self) -> &[NegotiatedCapability] {
        &self.entries
    }

    /// Capability owning wire code `code`.
    pub fn find_by_code(&self, code: u64) -> Option<&NegotiatedCapability> {
        self.entries.iter().find(|entry| entry.contains(code))
    }

    /// Negotiated capability by name.
    pub fn get(&self, name: &str) -> Option<&NegotiatedCapability> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Number of negotiated capabilities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was negotiated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First wire code after every assigned range.
    pub fn next_free_code(&self) -> u64 {
        self.entries
            .last()
            .map_or(BASE_PROTOCOL_LENGTH, |entry| entry.offset + entry.length)
    }
}
