//! Error types for the Ground Node

use std::net::SocketAddr;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ground Node error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listening socket could not be bound, even after the retry
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Error from the final bind attempt
        source: std::io::Error,
    },

    /// Frame body is not a valid message
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Frame body decoded but is not usable
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Frame exceeded the maximum body size
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// A message field contains a frame delimiter and cannot be encoded
    #[error("Field `{field}` contains a frame delimiter ('<' or '>')")]
    DelimiterInPayload {
        /// Name of the offending field
        field: &'static str,
    },

    /// Peer stopped reading and a frame write timed out
    #[error("Write timed out, peer is not reading")]
    WriteTimeout,

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    Disconnected,

    /// Worker thread could not be started
    #[error("Failed to spawn thread {name}: {source}")]
    ThreadSpawn {
        /// Thread name
        name: &'static str,
        /// Underlying spawn error
        source: std::io::Error,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the error means the connection is gone and the owning loop must stop.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            Error::Disconnected | Error::WriteTimeout => true,
            Error::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
