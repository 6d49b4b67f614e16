use rift_common::{ConfigError, ProtocolError};

/// Everything that can go wrong while serving relay traffic.
///
/// Apart from `Io` and `Config`, none of these stop the server: they decide
/// what happens to the one socket that caused them.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Conduit upgrade without a usable `userId`. Answered with 401.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(&'static str),

    /// Frame decoded but not valid in the socket's current state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Peer sent `send` before pairing.
    #[error("peer sent a message before pairing")]
    UnpairedSend,

    /// Frame could not be decoded at all.
    #[error("transport error: {0}")]
    Transport(#[from] ProtocolError),

    /// Upgrade request for a path that is neither `/conduit` nor `/mobile`.
    #[error("upgrade requested for unknown path {0}")]
    UnknownUpgradePath(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
