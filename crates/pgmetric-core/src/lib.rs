//! pgmetric-core — PostgreSQL background-writer metrics for a polling agent.
//!
//! Provides:
//! - `metric` — request, query and value types
//! - `resolver` — maps a metric (and its optional action) to SQL text and a declared type
//! - `coerce` — converts the returned scalar column into the declared type
//! - `executor` — query execution seam (`QueryExecutor`), PostgreSQL and mock backends
//! - `config` — connection configuration
//! - `request` — agent item-key parsing
//! - `handlers` — item-key handlers and the registered key table

pub mod coerce;
pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod metric;
pub mod request;
pub mod resolver;

pub use error::MetricError;
pub use executor::{PostgresExecutor, QueryExecutor, ScalarValue};
pub use handlers::{AgentResult, ErrorReporter, handle};
pub use metric::{MetricRequest, MetricResult, MetricValue, QuerySpec, ValueType};
pub use resolver::{MetricResolver, TimeRatioAction};

/// Crate version, shared with the binary's `--version` output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
