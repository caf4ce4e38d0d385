//! # Frame Codec
//!
//! Authenticated, encrypted framing keyed by the session `Secrets`.
//!
//! ```text
//! header-ct(16) ‖ header-mac(16) ‖ body-ct(padded to 16) ‖ body-mac(16)
//! ```
//!
//! Reference: devp2p RLPx "Framing"

// Semantic submodules
mod codec;
mod message;

// Re-export public API
pub use codec::{
    FrameCodec, FrameDecoder, FrameEncoder, BLOCK_SIZE, FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use message::Message;
