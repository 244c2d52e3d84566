//! Server error types.

use mssql_codec::CodecError;
use mssql_engine::EngineError;
use tds_protocol::{PacketType, ProtocolError};
use thiserror::Error;

/// Errors raised by the listener and connection handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Framing or transport failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A request payload failed to decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The engine could not be set up (catalog, session).
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Listener IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent a packet that is not valid at this point.
    #[error("unexpected {actual:?} packet, expected {expected}")]
    UnexpectedPacket {
        /// What the handshake expected.
        expected: &'static str,
        /// What arrived.
        actual: PacketType,
    },

    /// The client disconnected during the handshake.
    #[error("connection closed during {0}")]
    ClosedDuringHandshake(&'static str),

    /// A blocking engine task panicked or was cancelled.
    #[error("engine task failed: {0}")]
    TaskFailed(String),
}

impl ServerError {
    /// Whether the connection must be closed.
    ///
    /// Only engine errors during session setup are reported to the client;
    /// every other error ends the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Engine(_))
    }

    /// Whether the peer simply went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Codec(e) => e.is_disconnect(),
            Self::ClosedDuringHandshake(_) => true,
            _ => false,
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
