//! SQLite storage engine.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mssql_types::SqlValue;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ffi};

use crate::error::{EngineError, Result};
use crate::storage::{QueryResult, StatementOutcome, StorageEngine};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A database file.
    File(PathBuf),
    /// A private in-memory database.
    InMemory,
}

/// A SQLite database behind a mutex.
///
/// One connection per database; statements from different sessions are
/// serialized on the mutex.
#[derive(Debug)]
pub struct SqliteEngine {
    connection: Mutex<Connection>,
    location: Location,
}

impl SqliteEngine {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|e| EngineError::storage("<open>", e))?;
        Self::configure(connection, Location::File(path.to_path_buf()))
    }

    /// Create a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().map_err(|e| EngineError::storage("<open>", e))?;
        Self::configure(connection, Location::InMemory)
    }

    fn configure(connection: Connection, location: Location) -> Result<Self> {
        connection
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| EngineError::storage("<configure>", e))?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON")
            .map_err(|e| EngineError::storage("PRAGMA foreign_keys = ON", e))?;
        tracing::debug!(location = ?location, "opened sqlite database");
        Ok(Self {
            connection: Mutex::new(connection),
            location,
        })
    }

    /// Where the database is stored.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    fn collect_rows(stmt: &mut rusqlite::Statement<'_>, sql: &str) -> Result<QueryResult> {
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([]).map_err(|e| sqlite_error(sql, e))?;
        while let Some(row) = cursor.next().map_err(|e| sqlite_error(sql, e))? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let value = row.get_ref(i).map_err(|e| sqlite_error(sql, e))?;
                values.push(to_value(value));
            }
            rows.push(values);
        }
        Ok(QueryResult { columns, rows })
    }
}

impl StorageEngine for SqliteEngine {
    fn query(&self, sql: &str) -> Result<QueryResult> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(sql).map_err(|e| sqlite_error(sql, e))?;
        Self::collect_rows(&mut stmt, sql)
    }

    fn exec(&self, sql: &str) -> Result<u64> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(sql).map_err(|e| sqlite_error(sql, e))?;
        let changes = stmt.execute([]).map_err(|e| sqlite_error(sql, e))?;
        // sqlite keeps the last DML count across DDL statements.
        Ok(if modifies_rows(sql) { changes as u64 } else { 0 })
    }

    fn run(&self, sql: &str) -> Result<StatementOutcome> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(sql).map_err(|e| sqlite_error(sql, e))?;
        if stmt.column_count() > 0 {
            return Self::collect_rows(&mut stmt, sql).map(StatementOutcome::Rows);
        }
        let changes = stmt.execute([]).map_err(|e| sqlite_error(sql, e))?;
        Ok(StatementOutcome::Affected(if modifies_rows(sql) {
            changes as u64
        } else {
            0
        }))
    }
}

fn sqlite_error(sql: &str, err: rusqlite::Error) -> EngineError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if matches!(
            failure.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ) {
            return EngineError::UniqueViolation {
                statement: sql.to_owned(),
                message: err.to_string(),
            };
        }
    }
    EngineError::storage(sql, err)
}

fn modifies_rows(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default();
    ["INSERT", "UPDATE", "DELETE", "REPLACE"]
        .iter()
        .any(|kw| head.eq_ignore_ascii_case(kw))
}

fn to_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Int(v),
        ValueRef::Real(v) => SqlValue::Float(v),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            let mut hex = String::with_capacity(2 + bytes.len() * 2);
            hex.push_str("0x");
            for b in bytes {
                let _ = write!(hex, "{b:02X}");
            }
            SqlValue::Text(hex)
        }
    }
}
