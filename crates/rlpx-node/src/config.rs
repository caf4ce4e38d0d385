//! # Node Configuration
//!
//! TOML file plus `RLPX_*` environment overrides.
//!
//! # Config File Format
//!
//! ```toml
//! [node]
//! private_key = "<64 hex chars>"   # omitted: fresh identity per run
//! listen_addr = "0.0.0.0:30303"
//! client_name = "rlpx-node/v0.1.0"
//! max_peers = 25
//!
//! [rlpx]
//! handshake_timeout_ms = 5000
//! ping_interval_secs = 15          # 0 disables keepalive
//! max_frame_size = 16777215
//! inbound_queue_capacity = 256
//!
//! [peers]
//! static = ["enode://<128 hex>@10.0.0.2:30303"]
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `RLPX_PRIVATE_KEY` | `node.private_key` |
//! | `RLPX_LISTEN_ADDR` | `node.listen_addr` |
//! | `RLPX_CLIENT_NAME` | `node.client_name` |
//! | `RLPX_MAX_PEERS` | `node.max_peers` |
//! | `RLPX_STATIC_PEERS` | `peers.static` (comma separated) |

use rlpx_core::{Enode, RlpxConfig};
use serde::Deserialize;
use shared_crypto::{CryptoError, Secp256k1KeyPair};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {error}")]
    Io {
        /// Path of the file that failed to load
        path: String,
        /// Underlying I/O error
        error: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds an unusable value
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity and listener
    pub node: NodeSection,
    /// Session tuning
    pub rlpx: RlpxSection,
    /// Peers dialed at startup
    pub peers: PeersSection,
}

/// `[node]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Hex secp256k1 secret key; a fresh one is generated when absent
    pub private_key: Option<String>,
    /// TCP listen address
    pub listen_addr: SocketAddr,
    /// Client identifier advertised in Hello
    pub client_name: Option<String>,
    /// Maximum concurrent sessions
    pub max_peers: usize,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            private_key: None,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 30303)),
            client_name: None,
            max_peers: RlpxConfig::default().max_peers,
        }
    }
}

/// `[rlpx]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RlpxSection {
    /// Bound on each handshake phase
    pub handshake_timeout_ms: u64,
    /// Keepalive interval; 0 disables it
    pub ping_interval_secs: u64,
    /// Largest accepted frame body
    pub max_frame_size: usize,
    /// Messages buffered per bound protocol
    pub inbound_queue_capacity: usize,
}

impl Default for RlpxSection {
    fn default() -> Self {
        let defaults = RlpxConfig::default();
        Self {
            handshake_timeout_ms: defaults.handshake_timeout.as_millis() as u64,
            ping_interval_secs: defaults.ping_interval.map_or(0, |interval| interval.as_secs()),
            max_frame_size: defaults.max_frame_size,
            inbound_queue_capacity: defaults.inbound_queue_capacity,
        }
    }
}

/// `[peers]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PeersSection {
    /// Enode URLs dialed once at startup
    #[serde(rename = "static")]
    pub static_peers: Vec<String>,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|error| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if the content is not valid for this schema.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `RLPX_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns error if an override cannot be parsed.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("RLPX_PRIVATE_KEY") {
            self.node.private_key = Some(key);
        }
        if let Some(addr) = lookup("RLPX_LISTEN_ADDR") {
            self.node.listen_addr = addr.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::Invalid {
                    field: "RLPX_LISTEN_ADDR",
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(name) = lookup("RLPX_CLIENT_NAME") {
            self.node.client_name = Some(name);
        }
        if let Some(max) = lookup("RLPX_MAX_PEERS") {
            self.node.max_peers = max.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    field: "RLPX_MAX_PEERS",
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(peers) = lookup("RLPX_STATIC_PEERS") {
            self.peers.static_peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns error if an override cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Session configuration for the transport.
    pub fn rlpx_config(&self) -> RlpxConfig {
        let mut config = RlpxConfig::default()
            .with_handshake_timeout(Duration::from_millis(self.rlpx.handshake_timeout_ms))
            .with_listen_port(self.node.listen_addr.port())
            .with_ping_interval(
                Some(self.rlpx.ping_interval_secs)
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            )
            .with_max_peers(self.node.max_peers)
            .with_max_frame_size(self.rlpx.max_frame_size)
            .with_inbound_queue_capacity(self.rlpx.inbound_queue_capacity);
        if let Some(name) = &self.node.client_name {
            config = config.with_client_name(name.clone());
        }
        config
    }

    /// The node's static key: configured, or freshly generated.
    ///
    /// # Errors
    ///
    /// Returns error if the configured key is not 32 hex-encoded bytes or
    /// not a valid secp256k1 scalar.
    pub fn private_key(&self) -> Result<Secp256k1KeyPair, ConfigError> {
        let Some(encoded) = &self.node.private_key else {
            warn!("no private key configured, using an ephemeral identity");
            return Ok(Secp256k1KeyPair::generate());
        };

        let invalid = |reason: String| ConfigError::Invalid {
            field: "node.private_key",
            reason,
        };
        let bytes = hex::decode(encoded.trim().trim_start_matches("0x"))
            .map_err(|e| invalid(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| invalid(format!("expected 32 bytes, got {}", bytes.len())))?;
        Secp256k1KeyPair::from_bytes(bytes).map_err(|e: CryptoError| invalid(e.to_string()))
    }

    /// Parsed static peers.
    ///
    /// # Errors
    ///
    /// Returns error naming the first malformed enode URL.
    pub fn static_peers(&self) -> Result<Vec<Enode>, ConfigError> {
        self.peers
            .static_peers
            .iter()
            .map(|url| {
                url.parse::<Enode>().map_err(|e| ConfigError::Invalid {
                    field: "peers.static",
                    reason: format!("{}: {}", url, e),
                })
            })
            .collect()
    }
}
