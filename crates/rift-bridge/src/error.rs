use rift_common::ProtocolError;
use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("control plane error ({status}): {message}")]
    ControlPlane { status: u16, message: String },

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// HTTP-style status reported to the mobile side for a failed request.
    pub fn status(&self) -> u16 {
        match self {
            Self::ControlPlane { status, .. } => *status,
            _ => 500,
        }
    }
}

impl From<tungstenite::Error> for BridgeError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
