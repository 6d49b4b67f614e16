//! Desktop side of Rift.
//!
//! The bridge holds one conduit connection to the relay (the tunnel), keeps a
//! session handler per paired mobile peer, and wires those handlers to the
//! local control plane the desktop app talks to. Encryption, the control
//! plane, and its discovery are injected through the traits re-exported here.

pub mod bridge;
pub mod control_plane;
pub mod discovery;
pub mod error;
pub mod keys;
pub mod mobile;
pub mod session;
pub mod tunnel;

pub use bridge::Bridge;
pub use control_plane::{ControlPlane, ControlPlaneEvent};
pub use discovery::{Discovery, DiscoveryEvent, LocalCandidate, LockfileDiscovery};
pub use error::{BridgeError, Result};
pub use keys::{EphemeralKeyPair, PublicKeySource};
pub use mobile::{BridgeStatus, ControlResponse};
pub use session::{DeviceInfo, SessionContext, SessionFactory, SessionHandler};
pub use tunnel::{TunnelClient, TunnelEvent};
