//! Relay wire protocol.
//!
//! Every frame is a WebSocket text frame holding a JSON array
//! `[opcode, ...args]`. Each direction has its own closed enum so an
//! unexpected opcode is a decode error rather than a silent fallthrough.
//! Payloads are opaque to the relay and travel as raw JSON values.

use std::collections::VecDeque;

use serde_json::Value;

use crate::errors::ProtocolError;
use crate::id::PairingId;

pub mod opcode {
    pub const CONNECT: &str = "connect";
    pub const CONNECT_RESULT: &str = "connect-result";
    pub const SEND: &str = "send";
    pub const RECEIVE: &str = "receive";
    pub const OPEN: &str = "open";
    pub const MESSAGE: &str = "message";
    pub const REPLY: &str = "reply";
    pub const CLOSE: &str = "close";
}

/// A frame type with a fixed JSON-array encoding.
pub trait WireFrame: Sized {
    /// Build the frame from its opcode and remaining array elements.
    fn from_parts(op: &str, args: Args) -> Result<Self, ProtocolError>;

    /// The JSON array for this frame.
    fn to_value(&self) -> Value;

    fn encode(&self) -> String {
        self.to_value().to_string()
    }

    fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Array(items) = value else {
            return Err(ProtocolError::NotAnArray);
        };
        let mut items: VecDeque<Value> = items.into();
        let op = match items.pop_front() {
            Some(Value::String(op)) => op,
            Some(other) => return Err(ProtocolError::UnknownOpcode(other.to_string())),
            None => return Err(ProtocolError::MissingOpcode),
        };
        Self::from_parts(&op, Args { items })
    }
}

/// Positional arguments following the opcode. Trailing extras are ignored.
#[derive(Debug)]
pub struct Args {
    items: VecDeque<Value>,
}

impl Args {
    fn next(&mut self) -> Option<Value> {
        self.items.pop_front()
    }

    fn value(&mut self, opcode: &'static str, what: &'static str) -> Result<Value, ProtocolError> {
        self.items.pop_front().ok_or(ProtocolError::BadArguments {
            opcode,
            reason: what,
        })
    }

    fn string(&mut self, opcode: &'static str, what: &'static str) -> Result<String, ProtocolError> {
        match self.value(opcode, what)? {
            Value::String(s) => Ok(s),
            _ => Err(ProtocolError::BadArguments {
                opcode,
                reason: what,
            }),
        }
    }

    fn pairing(&mut self, opcode: &'static str) -> Result<PairingId, ProtocolError> {
        self.string(opcode, "pairing id must be a string")
            .map(PairingId::from)
    }
}

// ---------------------------------------------------------------------------
// Peer (mobile) → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum PeerFrame {
    /// Ask to be paired with the conduit registered for `user_id`.
    Connect { user_id: String },
    /// Forward a payload to the paired conduit.
    Send { payload: Value },
}

impl WireFrame for PeerFrame {
    fn from_parts(op: &str, mut args: Args) -> Result<Self, ProtocolError> {
        match op {
            opcode::CONNECT => Ok(Self::Connect {
                user_id: args.string(opcode::CONNECT, "user id must be a string")?,
            }),
            opcode::SEND => Ok(Self::Send {
                payload: args.value(opcode::SEND, "missing payload")?,
            }),
            other => Err(ProtocolError::UnknownOpcode(other.to_string())),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Connect { user_id } => serde_json::json!([opcode::CONNECT, user_id]),
            Self::Send { payload } => serde_json::json!([opcode::SEND, payload]),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → peer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ServerToPeer {
    ConnectResult(bool),
    Receive(Value),
    /// The pairing was torn down from the conduit side.
    Close(PairingId),
}

impl WireFrame for ServerToPeer {
    fn from_parts(op: &str, mut args: Args) -> Result<Self, ProtocolError> {
        match op {
            opcode::CONNECT_RESULT => match args.value(opcode::CONNECT_RESULT, "missing result")? {
                Value::Bool(ok) => Ok(Self::ConnectResult(ok)),
                _ => Err(ProtocolError::BadArguments {
                    opcode: opcode::CONNECT_RESULT,
                    reason: "result must be a boolean",
                }),
            },
            opcode::RECEIVE => Ok(Self::Receive(
                args.value(opcode::RECEIVE, "missing payload")?,
            )),
            opcode::CLOSE => Ok(Self::Close(args.pairing(opcode::CLOSE)?)),
            other => Err(ProtocolError::UnknownOpcode(other.to_string())),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::ConnectResult(ok) => serde_json::json!([opcode::CONNECT_RESULT, ok]),
            Self::Receive(payload) => serde_json::json!([opcode::RECEIVE, payload]),
            Self::Close(id) => serde_json::json!([opcode::CLOSE, id]),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → conduit (desktop)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ServerToConduit {
    Open(PairingId),
    Message { pairing: PairingId, payload: Value },
    Close(PairingId),
}

impl WireFrame for ServerToConduit {
    fn from_parts(op: &str, mut args: Args) -> Result<Self, ProtocolError> {
        match op {
            opcode::OPEN => Ok(Self::Open(args.pairing(opcode::OPEN)?)),
            opcode::MESSAGE => Ok(Self::Message {
                pairing: args.pairing(opcode::MESSAGE)?,
                payload: args.value(opcode::MESSAGE, "missing payload")?,
            }),
            opcode::CLOSE => Ok(Self::Close(args.pairing(opcode::CLOSE)?)),
            other => Err(ProtocolError::UnknownOpcode(other.to_string())),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Open(id) => serde_json::json!([opcode::OPEN, id]),
            Self::Message { pairing, payload } => {
                serde_json::json!([opcode::MESSAGE, pairing, payload])
            }
            Self::Close(id) => serde_json::json!([opcode::CLOSE, id]),
        }
    }
}

// ---------------------------------------------------------------------------
// Conduit → server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConduitFrame {
    /// `pairing` is `None` when the uuid slot is not a string. Such a reply
    /// matches no peer. A missing payload is forwarded as `null`.
    Reply {
        pairing: Option<PairingId>,
        payload: Value,
    },
}

impl WireFrame for ConduitFrame {
    fn from_parts(op: &str, mut args: Args) -> Result<Self, ProtocolError> {
        match op {
            opcode::REPLY => Ok(Self::Reply {
                pairing: match args.next() {
                    Some(Value::String(id)) => Some(PairingId::from(id)),
                    _ => None,
                },
                payload: args.next().unwrap_or(Value::Null),
            }),
            other => Err(ProtocolError::UnknownOpcode(other.to_string())),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Reply { pairing, payload } => {
                serde_json::json!([opcode::REPLY, pairing, payload])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_connect() {
        let frame = PeerFrame::decode(r#"["connect","u1"]"#).unwrap();
        assert_eq!(
            frame,
            PeerFrame::Connect {
                user_id: "u1".into()
            }
        );
    }

    #[test]
    fn decodes_send_with_object_payload() {
        let frame = PeerFrame::decode(r#"["send",{"path":"/x"}]"#).unwrap();
        assert_eq!(
            frame,
            PeerFrame::Send {
                payload: json!({"path": "/x"})
            }
        );
    }

    #[test]
    fn peer_cannot_send_conduit_opcodes() {
        let err = PeerFrame::decode(r#"["reply","abc",{}]"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownOpcode("reply".into()));
    }

    #[test]
    fn conduit_cannot_send_peer_opcodes() {
        let err = ConduitFrame::decode(r#"["connect","u1"]"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownOpcode("connect".into()));
    }

    #[test]
    fn connect_requires_string_user() {
        let err = PeerFrame::decode(r#"["connect",42]"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::BadArguments {
                opcode: "connect",
                ..
            }
        ));
        let err = PeerFrame::decode(r#"["connect"]"#).unwrap_err();
        assert!(matches!(err, ProtocolError::BadArguments { .. }));
    }

    #[test]
    fn rejects_non_array_and_garbage() {
        assert_eq!(
            PeerFrame::decode(r#"{"op":"connect"}"#).unwrap_err(),
            ProtocolError::NotAnArray
        );
        assert_eq!(PeerFrame::decode("[]").unwrap_err(), ProtocolError::MissingOpcode);
        assert!(matches!(
            PeerFrame::decode("not json").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
        assert!(matches!(
            PeerFrame::decode("[7]").unwrap_err(),
            ProtocolError::UnknownOpcode(_)
        ));
    }

    #[test]
    fn encodes_server_frames_as_arrays() {
        assert_eq!(
            ServerToPeer::ConnectResult(true).encode(),
            r#"["connect-result",true]"#
        );
        assert_eq!(
            ServerToPeer::Receive(json!({"status": 200})).to_value(),
            json!(["receive", {"status": 200}])
        );
        let id = PairingId::from("uuid1");
        assert_eq!(
            ServerToConduit::Message {
                pairing: id.clone(),
                payload: json!({"path": "/x"})
            }
            .to_value(),
            json!(["message", "uuid1", {"path": "/x"}])
        );
        assert_eq!(ServerToConduit::Open(id).encode(), r#"["open","uuid1"]"#);
    }

    #[test]
    fn conduit_side_decodes_server_frames() {
        let frame = ServerToConduit::decode(r#"["message","u-1",[1,2]]"#).unwrap();
        assert_eq!(
            frame,
            ServerToConduit::Message {
                pairing: "u-1".into(),
                payload: json!([1, 2])
            }
        );
        assert_eq!(
            ServerToConduit::decode(r#"["close","u-1"]"#).unwrap(),
            ServerToConduit::Close("u-1".into())
        );
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let frame = ConduitFrame::decode(r#"["reply","p",1,"extra"]"#).unwrap();
        assert_eq!(
            frame,
            ConduitFrame::Reply {
                pairing: Some("p".into()),
                payload: json!(1)
            }
        );
    }

    #[test]
    fn loose_reply_arguments_still_decode() {
        assert_eq!(
            ConduitFrame::decode(r#"["reply",123,{}]"#).unwrap(),
            ConduitFrame::Reply {
                pairing: None,
                payload: json!({})
            }
        );
        assert_eq!(
            ConduitFrame::decode(r#"["reply","p"]"#).unwrap(),
            ConduitFrame::Reply {
                pairing: Some("p".into()),
                payload: Value::Null
            }
        );
        assert_eq!(
            ConduitFrame::decode(r#"["reply"]"#).unwrap(),
            ConduitFrame::Reply {
                pairing: None,
                payload: Value::Null
            }
        );
    }
}
