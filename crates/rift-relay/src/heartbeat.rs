//! Transport-level liveness pings.
//!
//! Every tick pings each open socket in both pools. Nothing tracks pongs:
//! a dead peer is only noticed when a write or read on it fails.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::hub::RelayHub;

/// Default ping interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub fn spawn_heartbeat(hub: RelayHub, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; nothing is connected yet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pinged = hub.ping_all().await;
            let online = hub.online_users().await;
            tracing::debug!(sockets = pinged, online = ?online, "Heartbeat tick");
        }
    })
}
