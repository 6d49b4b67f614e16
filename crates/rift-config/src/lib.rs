//! Rift configuration.
//!
//! One TOML file configures both halves of the system: the `[relay]`
//! section drives the public relay server, `[bridge]` drives the desktop
//! side. Every section uses serde defaults so partial files work.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{BridgeConfig, LogLevel, LoggingConfig, RelayServerConfig, RiftConfig};
