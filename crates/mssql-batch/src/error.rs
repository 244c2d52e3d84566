//! Batch front-end error types.

use mssql_types::TypeError;
use thiserror::Error;

/// Errors raised while parsing or evaluating batch text.
///
/// None of them are fatal to a connection; the failing statement is
/// reported back to the client and the batch stops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// An IF or WHILE block is missing `THEN`, `BEGIN`/`DO` or `END`.
    #[error("malformed {block} block: {reason}")]
    MalformedBlock {
        /// `IF` or `WHILE`.
        block: &'static str,
        /// What is missing or unexpected.
        reason: String,
    },

    /// A condition has no comparison operator.
    #[error("no comparison operator found in condition: {0}")]
    NoOperatorFound(String),

    /// Statement text does not match the expected syntax.
    #[error("incorrect syntax near '{near}': {reason}")]
    Syntax {
        /// Text around the problem.
        near: String,
        /// What was expected.
        reason: String,
    },

    /// A variable was used without being declared.
    #[error("must declare the scalar variable \"@{0}\"")]
    VariableNotDeclared(String),

    /// A variable was declared twice in one scope.
    #[error("the variable name '@{0}' has already been declared")]
    DuplicateVariable(String),

    /// A value could not be converted to a declared type.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// An expression operand could not be evaluated.
    #[error("cannot evaluate expression '{expression}': {reason}")]
    Expression {
        /// Expression text.
        expression: String,
        /// Underlying failure.
        reason: String,
    },
}

impl BatchError {
    pub(crate) fn syntax(near: impl Into<String>, reason: impl Into<String>) -> Self {
        let near: String = near.into();
        Self::Syntax {
            near: near.chars().take(40).collect(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(block: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedBlock {
            block,
            reason: reason.into(),
        }
    }
}

/// Result type for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;
