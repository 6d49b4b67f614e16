use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// A frame that could not be decoded into one of the closed opcode enums.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("frame is not a JSON array")]
    NotAnArray,

    #[error("frame has no opcode")]
    MissingOpcode,

    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    #[error("bad arguments for {opcode}: {reason}")]
    BadArguments {
        opcode: &'static str,
        reason: &'static str,
    },
}
