//! # mssql-codec
//!
//! Async framing layer for TDS packet handling on the server side.
//!
//! This crate turns a raw byte stream into TDS packets and whole messages,
//! handling packet reassembly across TCP segment boundaries and packet
//! continuation for large messages in both directions.
//!
//! ## Architecture
//!
//! ```text
//! TCP Stream → TdsCodec (packet framing) → MessageAssembler → request handler
//! request handler → split_message → TdsCodec → TCP Stream
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod framed;
pub mod message;
pub mod packet_codec;

pub use connection::Connection;
pub use error::CodecError;
pub use framed::{PacketReader, PacketWriter};
pub use message::{DEFAULT_MAX_MESSAGE_SIZE, Message, MessageAssembler, split_message};
pub use packet_codec::{Packet, TdsCodec};
