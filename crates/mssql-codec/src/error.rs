//! Codec error types.

use thiserror::Error;

/// Errors raised while framing TDS packets over a byte stream.
///
/// All of them are fatal to the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A wire structure failed to decode.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_protocol::ProtocolError),

    /// The underlying transport failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The declared packet length is smaller than the header.
    #[error("invalid packet header")]
    InvalidHeader,

    /// The declared packet length exceeds the configured maximum.
    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge {
        /// Declared size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A multi-packet request grew beyond the configured message size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Bytes buffered including the offending packet.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The stream ended in the middle of a packet.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Bytes the header declared.
        expected: usize,
        /// Bytes received before end of stream.
        actual: usize,
    },

    /// The stream ended between packets of a multi-packet message.
    #[error("connection closed in the middle of a message")]
    ConnectionClosed,
}

impl CodecError {
    /// Whether the peer simply went away, as opposed to sending garbage.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Self::ConnectionClosed | Self::IncompletePacket { .. } => true,
            _ => false,
        }
    }
}
