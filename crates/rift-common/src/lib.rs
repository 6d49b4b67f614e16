//! Types shared by the relay server and the desktop bridge: the wire
//! protocol spoken over the relay, pairing identifiers, and error types.

pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{ConfigError, ProtocolError};
pub use id::{ConnId, PairingId};
pub use protocol::{ConduitFrame, PeerFrame, ServerToConduit, ServerToPeer, WireFrame};
