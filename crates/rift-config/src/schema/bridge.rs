use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the desktop bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Base URL of the relay server. `http(s)://` is rewritten to `ws(s)://`.
    pub relay_url: String,
    /// Identity the conduit registers under. Authenticated upstream.
    pub user_id: String,
    /// Delay before the single reconnect attempt after an unexpected close.
    pub reconnect_delay_ms: u64,
    /// How often the local control-plane lockfile is polled.
    pub discovery_interval_ms: u64,
    /// Lockfile advertising the local control plane.
    pub lockfile_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:51001".into(),
            user_id: String::new(),
            reconnect_delay_ms: 5_000,
            discovery_interval_ms: 3_000,
            lockfile_path: None,
        }
    }
}
