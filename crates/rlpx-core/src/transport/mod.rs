//! Transport layer: RLPx connections over tokio byte streams.
//!
//! ## Components
//!
//! - `config` - Session timeouts and limits
//! - `framed` - Frame reader/writer over split stream halves
//! - `connection` - Encryption + protocol handshake sequencing

mod config;
mod connection;
mod framed;

pub use config::RlpxConfig;
pub use connection::{Connection, ConnectionParts};
pub(crate) use connection::DISCONNECT_TIMEOUT;
pub use framed::{BoxedReader, BoxedWriter, FrameReader, FrameWriter};

#[cfg(test)]
mod tests;
