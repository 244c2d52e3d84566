//! # mssql-engine
//!
//! Executes T-SQL batches on top of embedded SQLite databases.
//!
//! - [`Catalog`] maps database names to [`SqliteEngine`]s
//! - [`ProcedureStore`] persists stored procedures inside each database
//! - [`Executor`] runs batches: procedural statements are handled here,
//!   everything else goes to the [`StorageEngine`] with variables
//!   substituted
//! - [`Session`] is one logged-in client
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mssql_engine::{Executor, ExecutorConfig, SqliteEngine};
//! use mssql_types::SqlValue;
//!
//! let engine = Arc::new(SqliteEngine::in_memory().unwrap());
//! let mut executor = Executor::new(engine, ExecutorConfig::default()).unwrap();
//! let result = executor
//!     .execute("DECLARE @n INT = 20; SELECT @n + 1 AS answer")
//!     .unwrap();
//! assert_eq!(result.rows, vec![vec![SqlValue::Int(21)]]);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod error;
pub mod executor;
pub mod procedure;
pub mod session;
pub mod sqlite;
pub mod storage;

pub use catalog::{Catalog, MASTER_DATABASE};
pub use mssql_batch::BatchError;
pub use error::{EngineError, Result, USER_ERROR_NUMBER};
pub use executor::{
    BatchOutcome, DEFAULT_VERSION, ExecuteResult, Executor, ExecutorConfig, ProcedureArgument,
};
pub use procedure::{PROCEDURES_TABLE, Procedure, ProcedureStore};
pub use session::{LoginInfo, SP_EXECUTESQL, Session};
pub use sqlite::{Location, SqliteEngine};
pub use storage::{QueryResult, StatementOutcome, StorageEngine};
