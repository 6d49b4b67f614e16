use serde::{Deserialize, Serialize};

/// Configuration for the public relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to listen on. The `PORT` environment variable overrides this.
    pub port: u16,
    /// How often every open socket is pinged, in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 51001,
            heartbeat_interval_ms: 10_000,
        }
    }
}

impl RelayServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
