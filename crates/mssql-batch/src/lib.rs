//! # mssql-batch
//!
//! Procedural front-end for T-SQL batches.
//!
//! This crate turns batch text into executable pieces without touching a
//! storage engine:
//!
//! - [`split_statements`] splits a batch on top-level `;`
//! - [`parse_statement`] classifies one statement by its leading keywords
//! - [`parse_if_block`] / [`parse_while_block`] parse control-flow blocks
//! - [`parse_condition`] / [`evaluate`] handle comparison and logical
//!   expressions against a [`Context`] of declared variables
//! - [`substitute_variables`] rewrites `@name` references in query text
//!
//! All parsers share one scanner, so quoting, comments and nesting are
//! treated the same way everywhere.
//!
//! ## Example
//!
//! ```rust
//! use mssql_batch::{Context, StatementKind, evaluate, parse_condition, parse_statement, split_statements};
//! use mssql_types::{SqlType, SqlValue};
//!
//! let statements = split_statements("DECLARE @id INT; SET @id = 1; SELECT @id");
//! assert_eq!(statements.len(), 3);
//! assert_eq!(parse_statement(&statements[1]), StatementKind::Set);
//!
//! let mut ctx = Context::new();
//! ctx.declare("@id", SqlType::parse("INT").unwrap(), Some(SqlValue::Int(1))).unwrap();
//! let cond = parse_condition("@id = 1").unwrap();
//! assert!(evaluate(&cond, &ctx).unwrap());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod assignment;
pub mod condition;
pub mod context;
pub mod control_flow;
pub mod error;
mod nesting;
pub mod procedure;
pub mod scanner;
pub mod statement;
pub mod substitute;

pub use assignment::{
    Declaration, SelectAssignment, SetStatement, parse_declare, parse_select_assignment, parse_set,
};
pub use condition::{
    ComparisonOp, LogicalCondition, LogicalOp, Operand, compare_values, evaluate, evaluate_with,
    parse_condition,
};
pub use context::{Context, Variable, normalize_name};
pub use control_flow::{Block, BlockKind, parse_if_block, parse_while_block};
pub use error::{BatchError, Result};
pub use procedure::{
    Argument, ArgumentValue, DropProcedure, ExecuteCall, Parameter, ProcedureDefinition,
    parse_create_procedure, parse_drop_procedure, parse_execute,
};
pub use statement::{StatementKind, parse_statement, split_statements};
pub use substitute::{Reference, substitute_context, substitute_variables};
