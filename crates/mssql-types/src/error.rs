//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur while parsing type names or coercing values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The type name is not one of the supported variable types.
    #[error("unknown data type: {0}")]
    UnknownType(String),

    /// The type arguments in parentheses are malformed.
    #[error("invalid type arguments for {type_name}: {arguments}")]
    InvalidArguments {
        /// Type the arguments were given for.
        type_name: &'static str,
        /// Raw argument text.
        arguments: String,
    },

    /// The value cannot be represented as the target type.
    #[error("conversion failed when converting '{value}' to data type {target}")]
    Conversion {
        /// Rendered source value.
        value: String,
        /// Target type name.
        target: String,
    },

    /// The value is numeric but outside the target type's range.
    #[error("arithmetic overflow converting {value} to data type {target}")]
    OutOfRange {
        /// Rendered source value.
        value: String,
        /// Target type name.
        target: &'static str,
    },
}
