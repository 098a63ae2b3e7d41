//! Errors raised while compiling URL patterns and configuring parameters.

use thiserror::Error;

/// Errors that can occur while compiling a pattern or building a parameter.
///
/// These are configuration errors: they surface synchronously at compile or
/// registration time and are never produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A placeholder name does not match `\w+([-.]+\w+)*(\[\])?`.
    #[error("invalid parameter name '{name}' in pattern '{pattern}'")]
    InvalidParamName { name: String, pattern: String },

    /// The same placeholder name was declared twice in one pattern.
    #[error("duplicate parameter name '{name}' in pattern '{pattern}'")]
    DuplicateParam { name: String, pattern: String },

    /// An inline sub-pattern introduced extra capture groups.
    #[error("unbalanced capture group in pattern '{pattern}': expected {expected}, found {found}")]
    UnbalancedCaptures {
        pattern: String,
        expected: usize,
        found: usize,
    },

    /// The compiled regular expression was rejected.
    #[error("invalid regular expression in pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// A parameter referenced a type name that is not registered.
    #[error("unknown parameter type '{0}'")]
    UnknownType(String),

    /// A type with this name is already registered.
    #[error("a parameter type named '{0}' is already defined")]
    DuplicateType(String),

    /// `auto` array mode was requested outside the query string.
    #[error("'auto' array mode is for query parameters only (parameter '{0}')")]
    AutoArrayOutsideQuery(String),

    /// The configured default value is not a value of the parameter's type.
    #[error("default value for parameter '{0}' is not valid for its type")]
    InvalidDefault(String),
}

/// Result type for pattern compilation.
pub type PatternResult<T> = Result<T, PatternError>;
