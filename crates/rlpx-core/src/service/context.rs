//! Per-binding I/O handle given to sub-protocols.

use super::peer::PeerHandle;
use crate::domain::{DisconnectReason, NegotiatedCapability, NodeId, ProtocolError, RlpxError};
use std::fmt;

/// A sub-protocol's view of one session, scoped to its code range.
#[derive(Clone)]
pub struct ProtocolContext {
    peer: PeerHandle,
    capability: NegotiatedCapability,
}

impl ProtocolContext {
    pub(crate) fn new(peer: PeerHandle, capability: NegotiatedCapability) -> Self {
        Self { peer, capability }
    }

    /// Remote static identity.
    pub fn remote_id(&self) -> NodeId {
        self.peer.remote_id()
    }

    /// The capability this protocol was bound to.
    pub fn capability(&self) -> &NegotiatedCapability {
        &self.capability
    }

    /// The whole session.
    pub fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    /// Send a message with a local code; it goes out as `offset + code`.
    ///
    /// # Errors
    ///
    /// `ProtocolError::CodeOutOfRange` if `code` is not below the declared
    /// length, `TransportError::Closed` once the session is closing, and
    /// encoding or I/O failures.
    pub async fn send_data(&self, code: u64, payload: &[u8]) -> Result<(), RlpxError> {
        if code >= self.capability.length {
            return Err(ProtocolError::CodeOutOfRange {
                code,
                length: self.capability.length,
            }
            .into());
        }
        self.peer.send_raw(self.capability.offset + code, payload).await
    }

    /// End the whole session.
    pub async fn disconnect(&self, reason: DisconnectReason) {
        self.peer.disconnect(reason).await;
    }
}

impl fmt::Debug for ProtocolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolContext")
            .field("remote_id", &self.remote_id())
            .field("capability", &self.capability)
            .finish()
    }
}
