//! Scripted in-memory executor for testing handlers without a server.

use std::collections::VecDeque;

use super::{QueryExecutor, ScalarValue};
use crate::config::ConnectionConfig;
use crate::error::MetricError;

/// Executor that replays scripted results and records every query it sees.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    responses: VecDeque<Result<Option<ScalarValue>, MetricError>>,
    server_version_num: Option<i32>,
    /// SQL texts received, in order.
    queries: Vec<String>,
    /// Connection strings each query was sent to.
    targets: Vec<String>,
}

impl MockExecutor {
    /// Creates an executor with no scripted results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `version` as the server's `server_version_num`.
    pub fn with_server_version(mut self, version: i32) -> Self {
        self.server_version_num = Some(version);
        self
    }

    /// Queues a single-row, single-column result.
    pub fn with_row(mut self, value: ScalarValue) -> Self {
        self.responses.push_back(Ok(Some(value)));
        self
    }

    /// Queues a zero-row result.
    pub fn with_empty(mut self) -> Self {
        self.responses.push_back(Ok(None));
        self
    }

    /// Queues an execution failure.
    pub fn with_error(mut self, error: MetricError) -> Self {
        self.responses.push_back(Err(error));
        self
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

impl QueryExecutor for MockExecutor {
    fn execute(
        &mut self,
        sql: &str,
        target: &ConnectionConfig,
    ) -> Result<Option<ScalarValue>, MetricError> {
        self.queries.push(sql.to_string());
        self.targets.push(target.connection_string().to_string());
        self.responses
            .pop_front()
            .unwrap_or_else(|| Err(MetricError::Query("no scripted response".to_string())))
    }

    fn server_version_num(
        &mut self,
        _target: &ConnectionConfig,
    ) -> Result<Option<i32>, MetricError> {
        Ok(self.server_version_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_responses_in_order() {
        let target = ConnectionConfig::with_connection_string("dbname=postgres");
        let mut mock = MockExecutor::new()
            .with_row(ScalarValue::Integer(1))
            .with_empty()
            .with_error(MetricError::Query("boom".into()));

        assert_eq!(
            mock.execute("SELECT 1", &target),
            Ok(Some(ScalarValue::Integer(1)))
        );
        assert_eq!(mock.execute("SELECT 2", &target), Ok(None));
        assert_eq!(
            mock.execute("SELECT 3", &target),
            Err(MetricError::Query("boom".into()))
        );
        assert!(mock.execute("SELECT 4", &target).is_err());

        assert_eq!(mock.queries(), ["SELECT 1", "SELECT 2", "SELECT 3", "SELECT 4"]);
        assert!(mock.targets().iter().all(|t| t == "dbname=postgres"));
    }

    #[test]
    fn reports_configured_server_version() {
        let target = ConnectionConfig::with_connection_string("");
        let mut mock = MockExecutor::new().with_server_version(170000);
        assert_eq!(mock.server_version_num(&target), Ok(Some(170000)));
        assert!(mock.queries().is_empty());
    }
}
