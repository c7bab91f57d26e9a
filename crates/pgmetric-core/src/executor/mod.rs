//! Query execution seam.
//!
//! The resolver never talks to a database. Handlers hand the built SQL to a
//! `QueryExecutor`, which returns the first column of the first row (or
//! nothing) as a typed scalar.
//!
//! - `PostgresExecutor` runs queries through the synchronous `postgres` driver.
//! - `MockExecutor` returns scripted results for tests.

pub mod mock;
mod pg_executor;

pub use mock::MockExecutor;
pub use pg_executor::PostgresExecutor;

use crate::config::ConnectionConfig;
use crate::error::MetricError;

/// Single scalar column returned by a query, typed by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Short description used in coercion errors.
    pub fn describe(&self) -> String {
        match self {
            ScalarValue::Integer(n) => format!("integer {}", n),
            ScalarValue::Float(x) => format!("float {}", x),
            ScalarValue::Text(s) => format!("text '{}'", s),
        }
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Integer(n) => write!(f, "{}", n),
            ScalarValue::Float(x) => write!(f, "{}", x),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

/// Executes metric queries against a target server/database.
pub trait QueryExecutor {
    /// Runs `sql` and returns the first column of the first row.
    ///
    /// `Ok(None)` means zero rows or a NULL value; execution failures
    /// (connection, bad column, malformed SQL) are `Err`.
    fn execute(
        &mut self,
        sql: &str,
        target: &ConnectionConfig,
    ) -> Result<Option<ScalarValue>, MetricError>;

    /// Returns the target's `server_version_num`, if the backend knows it.
    fn server_version_num(
        &mut self,
        _target: &ConnectionConfig,
    ) -> Result<Option<i32>, MetricError> {
        Ok(None)
    }
}
