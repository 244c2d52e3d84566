//! The storage-engine seam.
//!
//! The executor never implements SQL semantics itself. Everything that is
//! not procedural is handed to a [`StorageEngine`] as plain SQL text.

use mssql_types::SqlValue;

use crate::error::Result;

/// Column names and rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Column names in select-list order.
    pub columns: Vec<String>,
    /// Rows, each with one value per column.
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    /// First column of the first row, if any.
    #[must_use]
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// What running one statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    /// The statement returned a result set.
    Rows(QueryResult),
    /// The statement modified data (or did not return rows).
    Affected(u64),
}

/// An embedded SQL engine.
///
/// Implementations serialize access internally; one engine may be shared by
/// every connection using the same database.
pub trait StorageEngine: Send + Sync {
    /// Run a statement expected to return rows.
    fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Run a statement that returns no rows, returning the rows affected.
    fn exec(&self, sql: &str) -> Result<u64>;

    /// Run a statement whose shape is not known in advance.
    ///
    /// The default treats statements starting with `SELECT`, `WITH`,
    /// `VALUES` or `PRAGMA` as queries.
    fn run(&self, sql: &str) -> Result<StatementOutcome> {
        let head = sql
            .trim_start()
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or_default();
        if ["SELECT", "WITH", "VALUES", "PRAGMA"]
            .iter()
            .any(|kw| head.eq_ignore_ascii_case(kw))
        {
            self.query(sql).map(StatementOutcome::Rows)
        } else {
            self.exec(sql).map(StatementOutcome::Affected)
        }
    }
}
