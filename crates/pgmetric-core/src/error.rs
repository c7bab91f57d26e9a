//! Error type shared by the resolver, executors and handlers.

use crate::metric::ValueType;

/// Failure outcome of a metric call.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricError {
    /// Unrecognized sub-metric selector (e.g. time-ratio action).
    InvalidParameter(String),
    /// Item key could not be parsed.
    InvalidKey(String),
    /// Item key is well-formed but not registered.
    UnsupportedKey(String),
    /// Connection to the server failed.
    Connection(String),
    /// Query execution failed.
    Query(String),
    /// Query executed but produced no row (or a NULL value).
    EmptyResult,
    /// Returned column cannot be converted to the declared type.
    Coercion { expected: ValueType, found: String },
}

impl std::fmt::Display for MetricError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricError::InvalidParameter(value) => {
                write!(f, "Invalid action parameter: {}", value)
            }
            MetricError::InvalidKey(msg) => write!(f, "Invalid item key: {}", msg),
            MetricError::UnsupportedKey(key) => write!(f, "Unsupported item key: {}", key),
            MetricError::Connection(msg) => write!(f, "PostgreSQL: {}", msg),
            MetricError::Query(msg) => write!(f, "PostgreSQL query error: {}", msg),
            MetricError::EmptyResult => write!(f, "No results returned for query"),
            MetricError::Coercion { expected, found } => {
                write!(f, "Cannot convert {} to {}", found, expected)
            }
        }
    }
}

impl std::error::Error for MetricError {}
