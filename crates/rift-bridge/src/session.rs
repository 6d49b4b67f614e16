//! Per-peer session handlers and the capabilities the bridge hands them.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use rift_common::PairingId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::BridgeInner;
use crate::error::Result;
use crate::mobile::{BridgeStatus, ControlResponse};

/// Owns the secure channel with one mobile peer.
///
/// The bridge calls these from a single worker per session, so calls for one
/// peer never overlap.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// Process a raw envelope from the peer. `None` means nothing further to do
    /// (key exchange step, duplicate, etc.).
    async fn handle_message(&self, envelope: Value) -> Result<Option<String>>;

    /// Act on a decrypted message and produce a plaintext response.
    async fn handle_decrypted_message(&self, message: &str) -> Result<Option<Value>>;

    async fn encrypt_message(&self, message: Value) -> Result<Value>;

    /// True once the secure channel is established.
    fn is_ready(&self) -> bool;

    /// Whether events on `path` should still reach this peer.
    fn matches_observed_path(&self, path: &str) -> bool;

    /// Release handler resources. Called once, when the session ends.
    fn cleanup(&self);
}

/// Builds a handler for each new pairing.
pub trait SessionFactory: Send + Sync {
    fn create(&self, pairing: &PairingId, ctx: SessionContext) -> Arc<dyn SessionHandler>;
}

/// Describes the device asking to connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device: String,
    pub browser: String,
    pub identity: String,
}

/// Capabilities a handler can use. Holds only a weak reference to the
/// bridge, so a handler outliving its bridge sees inert calls.
#[derive(Clone)]
pub struct SessionContext {
    pairing: PairingId,
    bridge: Weak<BridgeInner>,
}

impl SessionContext {
    pub(crate) fn new(pairing: PairingId, bridge: Weak<BridgeInner>) -> Self {
        Self { pairing, bridge }
    }

    pub fn pairing(&self) -> &PairingId {
        &self.pairing
    }

    /// Forward a request to the local control plane.
    pub async fn request(&self, path: &str, method: &str, body: Option<Value>) -> ControlResponse {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.control_request(path, method, body).await,
            None => ControlResponse::error(500, "bridge stopped"),
        }
    }

    /// Connection requests are approved automatically.
    pub fn approve_connection(&self, device: &DeviceInfo) -> bool {
        tracing::info!(
            peer = %self.pairing,
            device = %device.device,
            browser = %device.browser,
            "Auto-approving mobile connection"
        );
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.schedule_status_broadcast();
        }
        true
    }

    /// The peer finished its handshake.
    pub fn connection_established(&self) {
        tracing::info!(peer = %self.pairing, "Mobile connection fully established");
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.notify_status();
        }
    }

    pub fn status(&self) -> BridgeStatus {
        self.bridge
            .upgrade()
            .map(|bridge| bridge.status())
            .unwrap_or_default()
    }

    pub fn subscribe(&self, path: &str) {
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.subscribe(&self.pairing, path);
        }
    }

    pub fn unsubscribe(&self, path: &str) {
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.unsubscribe(&self.pairing, path);
        }
    }
}
