//! # RLPx Node Binary
//!
//! ```text
//! rlpx-node [config.toml]
//! ```
//!
//! The config path may also come from `RLPX_CONFIG`. Log verbosity follows
//! `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use rlpx_node::{NodeConfig, NodeRuntime};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Load configuration from file (if given) and environment.
fn load_config() -> Result<NodeConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RLPX_CONFIG").ok());

    let mut config = match path {
        Some(path) => {
            info!(%path, "loading configuration");
            NodeConfig::load(&path)?
        }
        None => NodeConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("invalid environment override")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = load_config()?;
    let runtime = NodeRuntime::new(config).context("invalid node configuration")?;
    runtime.start().await?;

    info!("node is running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await;
    Ok(())
}
