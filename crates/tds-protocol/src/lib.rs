//! # tds-protocol
//!
//! Server-side implementation of the MS-TDS (Tabular Data Stream) wire
//! structures needed to answer a generic SQL Server client library.
//!
//! The crate covers the pieces of the protocol a lightweight TDS server
//! speaks:
//!
//! - the 8-byte packet header ([`PacketHeader`])
//! - the pre-login option block ([`PreLogin`])
//! - LOGIN7 decoding and the LOGINACK token ([`Login7`], [`LoginAck`])
//! - SQL batch payloads ([`decode_sql_batch`])
//! - RPC parameter lists ([`RpcRequest`])
//! - tabular result tokens ([`ResultSetEncoder`], [`Done`], [`ServerMessage`])
//!
//! ## Design Philosophy
//!
//! This crate is IO-agnostic. It contains no networking logic and makes no
//! assumptions about the async runtime. The `mssql-codec` crate frames these
//! structures over a byte stream.
//!
//! ## Example
//!
//! ```rust
//! use tds_protocol::{PacketHeader, PacketStatus, PacketType};
//!
//! let header = PacketHeader::new(PacketType::SqlBatch, PacketStatus::END_OF_MESSAGE, 100);
//! assert_eq!(header.payload_length(), 92);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod rpc;
pub mod sql_batch;
pub mod token;
pub mod types;
pub mod version;

pub use error::ProtocolError;
pub use login7::Login7;
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus,
    PacketType,
};
pub use prelogin::{EncryptionLevel, PreLogin, PreLoginOption};
pub use rpc::{RpcParam, RpcRequest, RpcValue};
pub use sql_batch::{decode_sql_batch, encode_sql_batch};
pub use token::{
    ColumnMeta, Done, DoneStatus, EnvChangeType, LoginAck, ResultSetEncoder, ServerMessage,
    Token, TokenParser, TokenType,
};
pub use types::TypeId;
pub use version::{SqlServerVersion, TdsVersion};
