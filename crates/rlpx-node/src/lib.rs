//! # RLPx Node
//!
//! Runnable node around the RLPx transport core.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (TOML file, then `RLPX_*` environment overrides)
//! 2. Load or generate the static key
//! 3. Bind the listener and log the local enode URL
//! 4. Dial each static peer once
//! 5. Run until interrupted, then disconnect every peer with `ClientQuitting`

pub mod config;
pub mod runtime;

pub use config::{ConfigError, NodeConfig};
pub use runtime::NodeRuntime;
