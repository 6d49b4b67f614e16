//! Configuration validation.
//!
//! Each section is checked independently and every problem is collected
//! into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::RiftConfig;
use rift_common::ConfigError;

use helpers::{validate_range, validate_ws_url};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &RiftConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_relay(&mut errors, config);
    validate_bridge(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_relay(errors: &mut Vec<String>, config: &RiftConfig) {
    if config.relay.host.trim().is_empty() {
        errors.push("relay.host must not be empty".into());
    }
    validate_range(
        errors,
        "relay.heartbeat_interval_ms",
        config.relay.heartbeat_interval_ms,
        1_000,
        300_000,
    );
}

fn validate_bridge(errors: &mut Vec<String>, config: &RiftConfig) {
    validate_ws_url(errors, "bridge.relay_url", &config.bridge.relay_url);
    validate_range(
        errors,
        "bridge.reconnect_delay_ms",
        config.bridge.reconnect_delay_ms,
        100,
        600_000,
    );
    validate_range(
        errors,
        "bridge.discovery_interval_ms",
        config.bridge.discovery_interval_ms,
        100,
        60_000,
    );
}
