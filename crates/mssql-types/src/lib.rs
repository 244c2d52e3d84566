//! # mssql-types
//!
//! Value model and SQL text rendering for the batch front-end.
//!
//! Every value that moves between RPC parameters, batch variables,
//! condition operands and result rows is a [`SqlValue`]. Declared variable
//! and parameter types are [`SqlType`]s, which know how to coerce a value on
//! assignment. [`format_value`] renders a value back into SQL text and is
//! the single rendering used for substitution.
//!
//! ## Type Mappings
//!
//! | SQL Server Type | `SqlValue` variant |
//! |-----------------|--------------------|
//! | `BIT` | `Bool` |
//! | `TINYINT`/`SMALLINT`/`INT`/`BIGINT` | `Int` |
//! | `DECIMAL(p,0)`/`NUMERIC(p,0)` | `Int` |
//! | `DECIMAL(p,s)`/`NUMERIC(p,s)` | `Float` |
//! | `REAL`/`FLOAT` | `Float` |
//! | `CHAR`/`VARCHAR`/`NCHAR`/`NVARCHAR` | `Text` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod sql_type;
pub mod value;

pub use error::TypeError;
pub use sql_type::{Length, SqlType, TypeKind, format_value};
pub use value::{SqlValue, quote, unquote};
