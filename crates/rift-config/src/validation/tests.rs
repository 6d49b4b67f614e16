//! Tests for the full validation pipeline.

use super::*;
use crate::schema::RiftConfig;

#[test]
fn default_config_validates() {
    assert!(validate(&RiftConfig::default()).is_ok());
}

#[test]
fn catches_heartbeat_too_short() {
    let mut config = RiftConfig::default();
    config.relay.heartbeat_interval_ms = 10;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.heartbeat_interval_ms"));
}

#[test]
fn catches_empty_host() {
    let mut config = RiftConfig::default();
    config.relay.host = "  ".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("relay.host"));
}

#[test]
fn catches_bad_relay_url_scheme() {
    let mut config = RiftConfig::default();
    config.bridge.relay_url = "ftp://relay".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("bridge.relay_url"));
}

#[test]
fn accepts_http_relay_url() {
    let mut config = RiftConfig::default();
    config.bridge.relay_url = "https://rift.example.com".into();
    assert!(validate(&config).is_ok());
}

#[test]
fn collects_multiple_errors() {
    let mut config = RiftConfig::default();
    config.bridge.reconnect_delay_ms = 0;
    config.bridge.discovery_interval_ms = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("bridge.reconnect_delay_ms"));
    assert!(err.contains("bridge.discovery_interval_ms"));
    assert!(err.contains("; "));
}
