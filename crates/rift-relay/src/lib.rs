//! rift-relay: public WebSocket relay between mobile peers and desktop
//! conduits.
//!
//! Each user has at most one conduit. Mobile peers pair with a conduit by
//! user id, after which the relay forwards opaque payloads between them,
//! tagged with the pairing id on the conduit side. Payloads are never
//! inspected.

pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod hub;
pub mod link;
pub mod pairing;
pub mod server;

pub use error::{RelayError, Result};
pub use heartbeat::HEARTBEAT_INTERVAL;
pub use hub::RelayHub;
pub use server::RelayServer;
