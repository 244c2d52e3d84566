//! # mssql-testing
//!
//! Test infrastructure for the TDS server.
//!
//! ## Features
//!
//! - A raw TDS client that returns decoded tokens instead of hiding them
//! - Fixtures for setting up databases, tables and procedures
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_testing::TestClient;
//!
//! #[tokio::test]
//! async fn test_select() {
//!     let (mut client, login) = TestClient::connect_and_login(addr).await.unwrap();
//!     assert!(login.login_ack().is_some());
//!
//!     let response = client.batch("SELECT 1 AS one").await.unwrap();
//!     let set = response.first_result_set().unwrap();
//!     assert_eq!(set.value(0, 0), Some("1"));
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod fixtures;

pub use client::{Response, ResultSet, TestClient, TestClientError};
pub use fixtures::TestFixture;
