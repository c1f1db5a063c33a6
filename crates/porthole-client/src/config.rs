//! Client configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with human-readable status messages: connect,
/// disconnect-with-retry-delay, heartbeat failure. Consumed by whatever
/// CLI/logging surrounds the client.
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Tunnel client configuration
#[derive(Clone)]
pub struct TunnelConfig {
    /// Port the local origin application listens on (`127.0.0.1:<port>`)
    pub local_port: u16,
    /// Edge endpoint; `http(s)://` is rewritten to `ws(s)://`
    pub edge_url: String,
    /// Bearer credential issued at session creation
    pub session_token: String,
    /// Public URL of the session, kept for display purposes only
    pub public_url: String,
    /// Interval between outbound pings while connected
    pub ping_interval: Duration,
    /// How long to wait for a pong before counting a heartbeat failure
    pub pong_timeout: Duration,
    /// Status message callback
    pub on_status: Option<StatusCallback>,
}

impl TunnelConfig {
    pub fn new(
        local_port: u16,
        edge_url: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            local_port,
            edge_url: edge_url.into(),
            session_token: session_token.into(),
            public_url: String::new(),
            ping_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(30),
            on_status: None,
        }
    }

    pub fn with_public_url(mut self, public_url: impl Into<String>) -> Self {
        self.public_url = public_url.into();
        self
    }

    pub fn with_heartbeat(mut self, ping_interval: Duration, pong_timeout: Duration) -> Self {
        self.ping_interval = ping_interval;
        self.pong_timeout = pong_timeout;
        self
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.on_status = Some(callback);
        self
    }
}

impl fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("local_port", &self.local_port)
            .field("edge_url", &self.edge_url)
            .field("public_url", &self.public_url)
            .field("ping_interval", &self.ping_interval)
            .field("pong_timeout", &self.pong_timeout)
            .field("on_status", &self.on_status.is_some())
            .finish()
    }
}
