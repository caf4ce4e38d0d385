use crate::domain::MAX_FRAME_SIZE;
use std::time::Duration;

/// RLPx session configuration.
#[derive(Clone, Debug)]
pub struct RlpxConfig {
    /// Bound on each handshake phase (encryption, then protocol)
    pub handshake_timeout: Duration,
    /// Client identifier advertised in Hello
    pub client_name: String,
    /// TCP port advertised in Hello (0 if not listening)
    pub listen_port: u16,
    /// Keep-alive Ping interval (None to disable)
    pub ping_interval: Option<Duration>,
    /// Maximum concurrent sessions
    pub max_peers: usize,
    /// Largest accepted frame body
    pub max_frame_size: usize,
    /// Messages buffered per bound protocol before the session is dropped
    pub inbound_queue_capacity: usize,
}

impl Default for RlpxConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            client_name: format!("rlpx-core/v{}", env!("CARGO_PKG_VERSION")),
            listen_port: 0,
            ping_interval: Some(Duration::from_secs(15)),
            max_peers: 25,
            max_frame_size: MAX_FRAME_SIZE,
            inbound_queue_capacity: 256,
        }
    }
}

impl RlpxConfig {
    /// Create config for testing with shorter timeouts.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(500),
            client_name: "rlpx-test".to_string(),
            listen_port: 0,
            ping_interval: None, // Deterministic frame sequences
            max_peers: 8,
            max_frame_size: MAX_FRAME_SIZE,
            inbound_queue_capacity: 64,
        }
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the advertised client name.
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Set the advertised listen port.
    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Set or disable the keep-alive interval.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the session cap.
    #[must_use]
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Set the frame size limit (clamped to the 24-bit header field).
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size.min(MAX_FRAME_SIZE);
        self
    }

    /// Set the per-protocol inbound queue capacity (at least 1).
    #[must_use]
    pub fn with_inbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.inbound_queue_capacity = capacity.max(1);
        self
    }
}
