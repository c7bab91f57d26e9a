//! Request, query and value types for a single metric call.
//!
//! Nothing here outlives one request: a `QuerySpec` is built, executed once
//! and dropped, and the resulting `MetricResult` is handed back to the caller.

use serde::Serialize;

use crate::error::MetricError;

/// A metric requested by the agent, already stripped of its key namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRequest {
    /// Field name or derived metric name (e.g. `buffers_clean`, `checkpoint_time_ratio`).
    pub metric_name: String,
    /// Optional qualifier narrowing the metric (e.g. time-ratio action).
    pub sub_parameter: Option<String>,
}

impl MetricRequest {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            sub_parameter: None,
        }
    }

    /// Sets the sub-parameter. Empty strings are treated as absent.
    pub fn with_sub_parameter(mut self, sub_parameter: Option<&str>) -> Self {
        self.sub_parameter = sub_parameter
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }
}

/// Declared result type of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    Float,
    String,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
        };
        f.write_str(name)
    }
}

/// SQL text to run plus the type its single column is declared as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub sql_text: String,
    pub expected_type: ValueType,
}

impl QuerySpec {
    pub(crate) fn new(sql_text: impl Into<String>, expected_type: ValueType) -> Self {
        Self {
            sql_text: sql_text.into(),
            expected_type,
        }
    }
}

/// Typed metric value returned to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetricValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            MetricValue::Integer(_) => ValueType::Integer,
            MetricValue::Float(_) => ValueType::Float,
            MetricValue::String(_) => ValueType::String,
        }
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Integer(n) => write!(f, "{}", n),
            MetricValue::Float(x) => write!(f, "{}", x),
            MetricValue::String(s) => f.write_str(s),
        }
    }
}

/// Outcome of an executed metric query.
///
/// `value == None` means the query ran but returned no row (or NULL),
/// which is distinct from an execution failure.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub value: Option<MetricValue>,
}

impl MetricResult {
    pub fn present(value: MetricValue) -> Self {
        Self { value: Some(value) }
    }

    pub fn absent() -> Self {
        Self { value: None }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Converts an absent result into `MetricError::EmptyResult`.
    pub fn into_value(self) -> Result<MetricValue, MetricError> {
        self.value.ok_or(MetricError::EmptyResult)
    }
}
