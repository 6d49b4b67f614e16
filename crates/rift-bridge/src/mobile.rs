//! Frames the bridge itself sends to mobile peers, on top of whatever the
//! session handler produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod opcode {
    /// Connection status broadcast.
    pub const STATUS: &str = "status";
    /// Event on an observed control-plane path.
    pub const UPDATE: &str = "update";
    /// Handler output that goes to the peer without re-encryption.
    pub const SECRET_RESPONSE: &str = "secret-response";
    /// Unencrypted bootstrap frame carrying the desktop public key.
    pub const PUBKEY: &str = "PUBKEY";
}

/// What the desktop UI and every ready peer see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub tunnel_connected: bool,
    pub local_connected: bool,
    pub peer_connected: bool,
}

/// Result of a control-plane request as reported back to the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub status: u16,
    pub content: Value,
}

impl ControlResponse {
    pub fn ok(content: Value) -> Self {
        Self {
            status: 200,
            content,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            content: serde_json::json!({ "error": message.into() }),
        }
    }
}

pub fn status_frame(status: &BridgeStatus) -> Value {
    serde_json::json!([opcode::STATUS, status])
}

pub fn update_frame(path: &str, data: &Value) -> Value {
    serde_json::json!([opcode::UPDATE, path, 200, data])
}

pub fn pubkey_frame(key: &str) -> Value {
    serde_json::json!([opcode::PUBKEY, key])
}

/// Parse handler output that is a JSON array tagged with the pass-through
/// marker. Anything else (including non-JSON) returns `None`.
pub fn pass_through(text: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(text).ok()?;
    let is_marked = value
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_str)
        == Some(opcode::SECRET_RESPONSE);
    is_marked.then_some(value)
}
