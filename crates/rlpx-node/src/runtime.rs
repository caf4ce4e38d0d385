//! Node runtime: one [`Server`] plus the static peer set.

use crate::config::{ConfigError, NodeConfig};
use anyhow::{Context, Result};
use rlpx_core::{Enode, PeerHandle, Protocol, Server};
use std::sync::Arc;
use tracing::{info, warn};

/// The running node.
pub struct NodeRuntime {
    config: NodeConfig,
    server: Server,
}

impl NodeRuntime {
    /// Create a node without sub-protocols of its own.
    ///
    /// # Errors
    ///
    /// Returns error if the configured key is invalid.
    pub fn new(config: NodeConfig) -> Result<Self, ConfigError> {
        Self::with_protocols(config, Vec::new())
    }

    /// Create a node offering `protocols`.
    ///
    /// # Errors
    ///
    /// Returns error if the configured key is invalid.
    pub fn with_protocols(
        config: NodeConfig,
        protocols: Vec<Arc<dyn Protocol>>,
    ) -> Result<Self, ConfigError> {
        let key = Arc::new(config.private_key()?);
        let server = Server::new(config.rlpx_config(), key, protocols);
        Ok(Self { config, server })
    }

    /// The underlying server.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Bind the listener and dial every static peer once.
    ///
    /// Dials run in the background; failures are logged, not retried.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound or a static peer URL
    /// is malformed.
    pub async fn start(&self) -> Result<Enode> {
        let peers = self
            .config
            .static_peers()
            .context("invalid static peer list")?;

        let addr = self
            .server
            .bind(self.config.node.listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.node.listen_addr))?;
        let enode = Enode::new(self.server.local_id(), addr);
        info!(%enode, "node started");

        for peer in peers {
            tokio::spawn(dial_static(self.server.clone(), peer));
        }
        Ok(enode)
    }

    /// Disconnect every peer with `ClientQuitting` and wait for them.
    pub async fn shutdown(&self) {
        info!(peers = self.server.peer_count(), "initiating graceful shutdown");
        self.server.shutdown().await;
        info!("shutdown complete");
    }
}

async fn dial_static(server: Server, enode: Enode) -> Option<PeerHandle> {
    match server.dial(&enode).await {
        Ok(handle) => {
            info!(
                remote = %handle.remote_id(),
                client = %handle.remote_hello().client_name,
                capabilities = ?handle
                    .capabilities()
                    .entries()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
                "static peer connected"
            );
            Some(handle)
        }
        Err(error) => {
            warn!(remote = %enode.id, addr = %enode.addr, %error, "static peer dial failed");
            None
        }
    }
}
