//! Decoded frame contents.

/// One frame's message: wire code plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Wire (post-offset) message code
    pub code: u64,
    /// Message payload
    pub payload: Vec<u8>,
    /// Frame body size declared in the header
    pub size: usize,
}

impl Message {
    /// Create a message.
    pub fn new(code: u64, payload: Vec<u8>, size: usize) -> Self {
        Self {
            code,
            payload,
            size,
        }
    }
}
