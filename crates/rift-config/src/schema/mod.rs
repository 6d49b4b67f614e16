//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod bridge;
mod logging;
mod relay;

pub use bridge::*;
pub use logging::*;
pub use relay::*;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiftConfig {
    pub relay: RelayServerConfig,
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
}
