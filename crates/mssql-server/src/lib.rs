//! # mssql-server
//!
//! A TDS server that lets SQL Server client libraries talk to embedded
//! SQLite databases.
//!
//! Each accepted connection runs the PRELOGIN and LOGIN7 handshake and then
//! serves SQL batches and RPC calls through an `mssql-engine` session.
//! Authentication is not checked and encryption is never negotiated.
//!
//! ```rust,ignore
//! use mssql_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mssql_server::ServerError> {
//!     let config = ServerConfig::new().listen_addr("127.0.0.1:1433".parse().unwrap());
//!     Server::bind(config).await?.run().await
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod handler;
pub mod response;
pub mod server;

pub use config::{DEFAULT_LISTEN_ADDR, ServerConfig};
pub use error::{Result, ServerError};
pub use handler::ConnectionHandler;
pub use server::{Server, ServerHandle};
