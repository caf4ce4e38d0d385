//! # RLPx Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/  # Full sessions over loopback TCP
//! │   ├── sessions.rs   # Multiplexing, echo, keepalive, peer limits
//! │   └── hostile.rs    # Garbage, silence and truncation from raw sockets
//! └── benches/          # Handshake, ECIES and frame codec throughput
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rlpx-tests
//! cargo bench -p rlpx-tests
//! ```

pub mod integration;
