//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while decoding or encoding TDS wire structures.
///
/// Every variant is fatal to the connection that produced it: the server
/// cannot resynchronize with a client once framing or a decoder has failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes were available than a structure declared.
    #[error("incomplete packet: expected {expected} bytes, got {actual}")]
    IncompletePacket {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Input ended in the middle of a structure.
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Unknown packet type byte.
    #[error("invalid packet type: 0x{0:02X}")]
    InvalidPacketType(u8),

    /// Unknown bits set in the packet status byte.
    #[error("invalid packet status: 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// Declared packet length is smaller than the header itself.
    #[error("invalid packet length: {0}")]
    InvalidPacketLength(u16),

    /// RPC parameter carried a data type tag this server does not decode.
    #[error("unsupported parameter type: 0x{0:02X}")]
    UnsupportedParameterType(u8),

    /// Unknown token type in a token stream.
    #[error("invalid token type: 0x{0:02X}")]
    InvalidTokenType(u8),

    /// Text payload was not valid UTF-8 / UTF-16.
    #[error("invalid string encoding in {0}")]
    InvalidString(&'static str),

    /// A result set has more columns than COLMETADATA can describe.
    #[error("too many columns for a result set: {0}")]
    TooManyColumns(usize),

    /// A row does not have the column count announced by COLMETADATA.
    #[error("row has {actual} values, metadata declares {expected}")]
    ColumnCountMismatch {
        /// Columns in the metadata.
        expected: usize,
        /// Values in the row.
        actual: usize,
    },

    /// A value is too long for the length field that must describe it.
    #[error("{what} is {length} bytes, at most {max} fit")]
    ValueTooLong {
        /// What was being encoded.
        what: &'static str,
        /// Encoded length in bytes.
        length: usize,
        /// Largest length the field can carry.
        max: usize,
    },

    /// A ROW token arrived before any COLMETADATA.
    #[error("row token without column metadata")]
    MissingMetadata,
}
