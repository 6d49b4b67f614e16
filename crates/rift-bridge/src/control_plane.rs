//! The local service the bridge fronts for mobile peers.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::discovery::LocalCandidate;
use crate::error::Result;

/// One event on an observed path.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPlaneEvent {
    pub path: String,
    pub data: Value,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Verify and bind to a discovered instance.
    async fn attach(&self, candidate: &LocalCandidate) -> Result<()>;

    fn detach(&self);

    fn is_connected(&self) -> bool;

    /// Perform a request. Failures carry a status via
    /// [`BridgeError::ControlPlane`](crate::BridgeError::ControlPlane).
    async fn request(&self, path: &str, method: &str, body: Option<Value>) -> Result<Value>;

    /// Subscribe to events on `path`. Dropping the receiver unsubscribes.
    fn observe(&self, path: &str) -> mpsc::Receiver<ControlPlaneEvent>;
}
