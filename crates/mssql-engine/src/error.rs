//! Execution error types.

use mssql_batch::BatchError;
use thiserror::Error;

/// Error number used for failures that have no dedicated SQL Server number.
pub const USER_ERROR_NUMBER: i32 = 50000;

/// Errors raised while executing batches, procedures and catalog commands.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Parse or variable error from the batch front-end.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// No procedure with this name exists in the current database.
    #[error("could not find stored procedure '{0}'")]
    ProcedureNotFound(String),

    /// A procedure with this name already exists.
    #[error("there is already an object named '{0}' in the database")]
    DuplicateProcedure(String),

    /// A parameter without default was not supplied.
    #[error("procedure '{procedure}' expects parameter '{parameter}', which was not supplied")]
    MissingParameter {
        /// Procedure name.
        procedure: String,
        /// Parameter name, with `@`.
        parameter: String,
    },

    /// A named argument does not match any declared parameter.
    #[error("@{parameter} is not a parameter for procedure {procedure}")]
    UnexpectedParameter {
        /// Procedure name.
        procedure: String,
        /// Argument name without `@`.
        parameter: String,
    },

    /// More positional arguments than declared parameters.
    #[error("procedure or function {procedure} has too many arguments specified")]
    TooManyArguments {
        /// Procedure name.
        procedure: String,
    },

    /// Procedure calls nested deeper than the limit.
    #[error("maximum stored procedure nesting level exceeded (limit {0})")]
    NestingLimitExceeded(usize),

    /// A WHILE loop ran more iterations than allowed.
    #[error("WHILE loop exceeded the maximum of {limit} iterations")]
    LoopLimitExceeded {
        /// Configured iteration limit.
        limit: usize,
    },

    /// `BREAK` or `CONTINUE` outside a WHILE body.
    #[error("{0} statement is not inside a WHILE loop")]
    NotInLoop(&'static str),

    /// Unknown database.
    #[error("database '{0}' does not exist")]
    DatabaseNotFound(String),

    /// Database already exists.
    #[error("database '{0}' already exists")]
    DatabaseExists(String),

    /// Database name contains characters other than letters, digits and `_`.
    #[error("invalid database name '{0}'")]
    InvalidDatabaseName(String),

    /// Attempt to drop a database that must always exist.
    #[error("cannot drop the database '{0}'")]
    CannotDropDatabase(String),

    /// `USE` and database DDL need a catalog.
    #[error("database commands are not available without a catalog")]
    NoCatalog,

    /// The storage engine rejected a statement.
    #[error("{message} (statement: {statement})")]
    Storage {
        /// Statement text as sent to the engine.
        statement: String,
        /// Engine error message.
        message: String,
    },

    /// An insert or update hit a UNIQUE or PRIMARY KEY constraint.
    #[error("{message} (statement: {statement})")]
    UniqueViolation {
        /// Statement text as sent to the engine.
        statement: String,
        /// Engine error message.
        message: String,
    },

    /// A stored procedure row could not be decoded.
    #[error("stored procedure '{name}' is corrupt: {reason}")]
    CorruptProcedure {
        /// Procedure name.
        name: String,
        /// Decoding failure.
        reason: String,
    },

    /// Failure inside a procedure body.
    #[error("in procedure '{procedure}': {source}")]
    InProcedure {
        /// Procedure name.
        procedure: String,
        /// Underlying error.
        #[source]
        source: Box<EngineError>,
    },

    /// Filesystem error from the catalog.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn storage(statement: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage {
            statement: statement.to_owned(),
            message: err.to_string(),
        }
    }

    /// The SQL Server error number reported to clients.
    #[must_use]
    pub fn number(&self) -> i32 {
        match self {
            Self::Batch(err) => match err {
                BatchError::MalformedBlock { .. }
                | BatchError::NoOperatorFound(_)
                | BatchError::Syntax { .. } => 102,
                BatchError::VariableNotDeclared(_) => 137,
                BatchError::DuplicateVariable(_) => 134,
                BatchError::Type(_) => 245,
                BatchError::Expression { .. } => USER_ERROR_NUMBER,
            },
            Self::ProcedureNotFound(_) => 2812,
            Self::DuplicateProcedure(_) => 2714,
            Self::MissingParameter { .. } => 201,
            Self::UnexpectedParameter { .. } => 8145,
            Self::TooManyArguments { .. } => 8144,
            Self::NestingLimitExceeded(_) => 217,
            Self::DatabaseNotFound(_) => 911,
            Self::DatabaseExists(_) => 1801,
            Self::UniqueViolation { .. } => 2627,
            Self::InProcedure { source, .. } => source.number(),
            _ => USER_ERROR_NUMBER,
        }
    }

    /// Name of the innermost procedure the error was raised in.
    #[must_use]
    pub fn procedure(&self) -> Option<&str> {
        match self {
            Self::InProcedure { procedure, source } => {
                source.procedure().or(Some(procedure.as_str()))
            }
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
