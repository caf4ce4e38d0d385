//! # Integration Tests
//!
//! Every test binds real TCP listeners on 127.0.0.1 and drives sessions
//! through the public `Server` API.

pub mod hostile;
pub mod sessions;

use rlpx_core::test_utils::RecordingProtocol;
use rlpx_core::{Protocol, ProtocolSpec, RlpxConfig, Server};
use shared_crypto::Secp256k1KeyPair;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Ephemeral loopback address.
pub fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// A recording protocol behind an `Arc`.
pub fn recorder(name: &str, version: u32, length: u64) -> Arc<RecordingProtocol> {
    Arc::new(RecordingProtocol::new(ProtocolSpec::new(name, version, length)))
}

/// An echoing recording protocol behind an `Arc`.
pub fn echo(name: &str, version: u32, length: u64) -> Arc<RecordingProtocol> {
    Arc::new(RecordingProtocol::new(ProtocolSpec::new(name, version, length)).echoing())
}

/// Erase a recorder's concrete type.
pub fn dynamic(protocol: &Arc<RecordingProtocol>) -> Arc<dyn Protocol> {
    protocol.clone()
}

/// A server with a fresh identity.
pub fn server(config: RlpxConfig, protocols: Vec<Arc<dyn Protocol>>) -> Server {
    Server::new(config, Arc::new(Secp256k1KeyPair::generate()), protocols)
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
