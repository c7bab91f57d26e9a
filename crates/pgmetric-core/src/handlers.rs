//! Agent item-key handlers.
//!
//! Every registered key is handled the same way: the key name minus its `pg.`
//! prefix becomes a [`MetricRequest`], the resolver turns it into a query,
//! the executor runs it against the (possibly overridden) target and the
//! column is coerced to the declared type. [`handle`] is the single place
//! where a failed call is reported back to the agent, once, through an
//! [`ErrorReporter`].
//!
//! Parameters (all keys):
//!   0:  connection string (default: configured connection)
//!   1:  connection database (default: configured database)
//!
//! `pg.checkpoint_time_ratio` additionally takes
//!   2:  action: all (default) | write | sync

use tracing::{debug, warn};

use crate::coerce::coerce;
use crate::config::ConnectionConfig;
use crate::error::MetricError;
use crate::executor::QueryExecutor;
use crate::metric::{MetricRequest, MetricValue, QuerySpec};
use crate::request::{AgentRequest, PARAM_CONNECTION, PARAM_DATABASE, PARAM_FIRST};
use crate::resolver::{MetricResolver, TimeRatioAction};

/// Length of the `pg.` namespace prefix stripped from item keys.
const KEY_PREFIX_LEN: usize = 3;

/// Receives the failure message of a metric call.
pub trait ErrorReporter {
    fn report_error(&mut self, message: &str);
}

/// Outcome handed back to the agent: a typed value or an error message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentResult {
    value: Option<MetricValue>,
    error: Option<String>,
}

impl AgentResult {
    pub fn set_value(&mut self, value: MetricValue) {
        self.value = Some(value);
        self.error = None;
    }

    pub fn value(&self) -> Option<&MetricValue> {
        self.value.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl ErrorReporter for AgentResult {
    fn report_error(&mut self, message: &str) {
        self.value = None;
        self.error = Some(message.to_string());
    }
}

/// A registered agent item key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemKey {
    pub key: &'static str,
    pub description: &'static str,
    /// Whether parameter 2 is passed to the resolver as a time-ratio action.
    pub takes_action: bool,
}

const fn item(key: &'static str, description: &'static str) -> ItemKey {
    ItemKey {
        key,
        description,
        takes_action: false,
    }
}

/// All item keys this agent answers.
pub const ITEM_KEYS: &[ItemKey] = &[
    item("pg.checkpoints_timed", "Scheduled checkpoints performed"),
    item("pg.checkpoints_req", "Requested checkpoints performed"),
    item("pg.checkpoint_write_time", "Time spent writing checkpoint files (ms)"),
    item("pg.checkpoint_sync_time", "Time spent syncing checkpoint files (ms)"),
    item("pg.buffers_checkpoint", "Buffers written during checkpoints"),
    item("pg.buffers_clean", "Buffers written by the background writer"),
    item("pg.maxwritten_clean", "Background writer stops due to too many buffers"),
    item("pg.buffers_backend", "Buffers written directly by backends"),
    item("pg.buffers_backend_fsync", "Backend fsync calls"),
    item("pg.buffers_alloc", "Buffers allocated"),
    item("pg.stats_reset", "Time statistics were last reset"),
    item("pg.stats_reset_interval", "Seconds since statistics were last reset"),
    item("pg.checkpoint_avg_interval", "Average seconds between checkpoints"),
    ItemKey {
        key: "pg.checkpoint_time_ratio",
        description: "Fraction of time spent in checkpoint I/O [action: all|write|sync]",
        takes_action: true,
    },
];

/// Looks up a registered item key by name.
pub fn find_item(key: &str) -> Option<&'static ItemKey> {
    ITEM_KEYS.iter().find(|item| item.key == key)
}

/// Evaluates one agent request, reporting any failure through the result.
pub fn handle(
    executor: &mut dyn QueryExecutor,
    config: &ConnectionConfig,
    request: &AgentRequest,
) -> AgentResult {
    let mut result = AgentResult::default();
    match evaluate(executor, config, request) {
        Ok(value) => result.set_value(value),
        Err(e) => {
            warn!(key = %request.key, error = %e, "metric call failed");
            result.report_error(&e.to_string());
        }
    }
    result
}

/// Evaluates one agent request.
pub fn evaluate(
    executor: &mut dyn QueryExecutor,
    config: &ConnectionConfig,
    request: &AgentRequest,
) -> Result<MetricValue, MetricError> {
    let item =
        find_item(&request.key).ok_or_else(|| MetricError::UnsupportedKey(request.key.clone()))?;
    let metric = metric_request(item, request)?;

    // Reject unknown actions before touching the server.
    if item.takes_action {
        TimeRatioAction::parse(metric.sub_parameter.as_deref())?;
    }

    debug!(key = %request.key, params = ?request.params, "handling item");

    let target = config.with_overrides(
        request.param(PARAM_CONNECTION),
        request.param(PARAM_DATABASE),
    );
    let resolver = MetricResolver::new(executor.server_version_num(&target)?);
    let spec = resolver.resolve(&metric)?;
    let value = run(executor, &spec, &target)?;

    debug!(key = %request.key, value = %value, "item done");
    Ok(value)
}

/// Builds the resolver request for a registered key.
fn metric_request(item: &ItemKey, request: &AgentRequest) -> Result<MetricRequest, MetricError> {
    let name = item
        .key
        .get(KEY_PREFIX_LEN..)
        .ok_or_else(|| MetricError::InvalidKey(request.key.clone()))?;
    let action = if item.takes_action {
        request.param(PARAM_FIRST)
    } else {
        None
    };
    Ok(MetricRequest::new(name).with_sub_parameter(action))
}

/// Runs a resolved query and converts its column to the declared type.
fn run(
    executor: &mut dyn QueryExecutor,
    spec: &QuerySpec,
    target: &ConnectionConfig,
) -> Result<MetricValue, MetricError> {
    let scalar = executor.execute(&spec.sql_text, target)?;
    coerce(spec.expected_type, scalar)?.into_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockExecutor, ScalarValue};

    fn config() -> ConnectionConfig {
        ConnectionConfig::with_connection_string("host=localhost user=zabbix dbname=postgres")
    }

    fn eval(mock: &mut MockExecutor, key: &str) -> Result<MetricValue, MetricError> {
        let request = AgentRequest::parse(key).unwrap();
        evaluate(mock, &config(), &request)
    }

    #[test]
    fn counter_field_returns_integer() {
        let mut mock = MockExecutor::new().with_row(ScalarValue::Integer(5));
        assert_eq!(eval(&mut mock, "pg.checkpoints_timed"), Ok(MetricValue::Integer(5)));
        assert_eq!(
            mock.queries(),
            ["SELECT checkpoints_timed FROM pg_stat_bgwriter;"]
        );
    }

    #[test]
    fn checkpoint_field_returns_float() {
        let mut mock = MockExecutor::new().with_row(ScalarValue::Float(123.45));
        assert_eq!(
            eval(&mut mock, "pg.checkpoint_write_time"),
            Ok(MetricValue::Float(123.45))
        );
    }

    #[test]
    fn stats_reset_field_returns_string() {
        let mut mock =
            MockExecutor::new().with_row(ScalarValue::Text("2024-05-01 10:00:00+00:00".into()));
        assert_eq!(
            eval(&mut mock, "pg.stats_reset"),
            Ok(MetricValue::String("2024-05-01 10:00:00+00:00".into()))
        );
    }

    #[test]
    fn stats_reset_interval_truncates_to_integer() {
        let mut mock = MockExecutor::new().with_row(ScalarValue::Float(3600.0));
        assert_eq!(
            eval(&mut mock, "pg.stats_reset_interval"),
            Ok(MetricValue::Integer(3600))
        );
    }

    #[test]
    fn avg_interval_sends_zero_guarded_query() {
        // The arithmetic runs server-side; the mock only stands in for its answer.
        let mut mock = MockExecutor::new().with_row(ScalarValue::Float(0.0));
        assert_eq!(
            eval(&mut mock, "pg.checkpoint_avg_interval"),
            Ok(MetricValue::Float(0.0))
        );
        assert_eq!(
            mock.queries(),
            ["SELECT CASE checkpoints_timed + checkpoints_req WHEN 0 THEN 0 \
              ELSE EXTRACT(EPOCH FROM NOW() - stats_reset) / (checkpoints_timed + checkpoints_req) \
              END::double precision FROM pg_stat_bgwriter;"]
        );
    }

    #[test]
    fn time_ratio_sync_sends_sync_counter_query() {
        // checkpoint_sync_time = 500ms, elapsed = 1000s => (500 / 1000) / 1000,
        // computed by the server; the mock returns that answer.
        let mut mock = MockExecutor::new().with_row(ScalarValue::Float(0.0005));
        assert_eq!(
            eval(&mut mock, "pg.checkpoint_time_ratio[,,sync]"),
            Ok(MetricValue::Float(0.0005))
        );
        assert_eq!(
            mock.queries(),
            ["SELECT ((checkpoint_sync_time / 1000) / \
              NULLIF(EXTRACT(EPOCH FROM NOW() - stats_reset), 0))::double precision \
              FROM pg_stat_bgwriter;"]
        );
    }

    #[test]
    fn derived_keys_dispatch_through_resolver() {
        let resolver = MetricResolver::default();
        for (key, metric) in [
            ("pg.stats_reset_interval", MetricRequest::new("stats_reset_interval")),
            ("pg.checkpoint_avg_interval", MetricRequest::new("checkpoint_avg_interval")),
            (
                "pg.checkpoint_time_ratio[,,write]",
                MetricRequest::new("checkpoint_time_ratio").with_sub_parameter(Some("write")),
            ),
            ("pg.buffers_clean", MetricRequest::new("buffers_clean")),
        ] {
            let mut mock = MockExecutor::new().with_row(ScalarValue::Integer(1));
            eval(&mut mock, key).unwrap();
            assert_eq!(mock.queries(), [resolver.resolve(&metric).unwrap().sql_text]);
        }
    }

    #[test]
    fn action_is_ignored_for_keys_without_one() {
        let request = AgentRequest::parse("pg.buffers_clean[,,bogus]").unwrap();
        let item = find_item(&request.key).unwrap();
        let metric = metric_request(item, &request).unwrap();
        assert_eq!(metric, MetricRequest::new("buffers_clean"));
    }

    #[test]
    fn time_ratio_invalid_action_issues_no_query() {
        let mut mock = MockExecutor::new().with_row(ScalarValue::Float(1.0));
        let request = AgentRequest::parse("pg.checkpoint_time_ratio[,,bogus]").unwrap();

        let result = handle(&mut mock, &config(), &request);

        assert_eq!(result.error(), Some("Invalid action parameter: bogus"));
        assert_eq!(result.value(), None);
        assert!(mock.queries().is_empty());
    }

    #[test]
    fn zero_elapsed_time_ratio_is_empty_result() {
        let mut mock = MockExecutor::new().with_empty();
        assert_eq!(
            eval(&mut mock, "pg.checkpoint_time_ratio"),
            Err(MetricError::EmptyResult)
        );
    }

    #[test]
    fn executor_errors_propagate_unchanged() {
        let err = MetricError::Query("ERROR: column \"nope\" does not exist".into());
        let mut mock = MockExecutor::new().with_error(err.clone());
        assert_eq!(eval(&mut mock, "pg.buffers_clean"), Err(err));
    }

    #[test]
    fn unregistered_key_is_rejected_without_query() {
        let mut mock = MockExecutor::new();
        assert_eq!(
            eval(&mut mock, "pg.no_such_field"),
            Err(MetricError::UnsupportedKey("pg.no_such_field".into()))
        );
        assert!(mock.queries().is_empty());
    }

    #[test]
    fn params_override_connection_and_database() {
        let mut mock = MockExecutor::new().with_row(ScalarValue::Integer(1));
        eval(&mut mock, "pg.buffers_alloc[host=db2 user=mon,appdb]").unwrap();
        assert_eq!(mock.targets(), ["host=db2 user=mon dbname=appdb"]);

        let mut mock = MockExecutor::new().with_row(ScalarValue::Integer(1));
        eval(&mut mock, "pg.buffers_alloc[,appdb]").unwrap();
        assert_eq!(mock.targets(), ["host=localhost user=zabbix dbname=appdb"]);
    }

    #[test]
    fn pg17_reads_checkpointer_view() {
        let mut mock = MockExecutor::new()
            .with_server_version(170000)
            .with_row(ScalarValue::Integer(9))
            .with_row(ScalarValue::Float(0.25));

        assert_eq!(eval(&mut mock, "pg.checkpoints_req"), Ok(MetricValue::Integer(9)));
        assert_eq!(
            eval(&mut mock, "pg.checkpoint_time_ratio[,,write]"),
            Ok(MetricValue::Float(0.25))
        );
        assert_eq!(
            mock.queries()[0],
            "SELECT num_requested AS checkpoints_req FROM pg_stat_checkpointer;"
        );
        assert!(mock.queries()[1].contains("(write_time / 1000)"));
        assert!(mock.queries()[1].contains("FROM pg_stat_checkpointer"));
    }

    #[test]
    fn handle_reports_success_value() {
        let mut mock = MockExecutor::new().with_row(ScalarValue::Integer(42));
        let request = AgentRequest::parse("pg.buffers_alloc").unwrap();
        let result = handle(&mut mock, &config(), &request);
        assert!(!result.is_error());
        assert_eq!(result.value(), Some(&MetricValue::Integer(42)));
    }

    #[test]
    fn every_registered_key_resolves() {
        for item in ITEM_KEYS {
            let mut mock = MockExecutor::new().with_row(ScalarValue::Integer(1));
            let request = AgentRequest::parse(item.key).unwrap();
            assert!(
                evaluate(&mut mock, &config(), &request).is_ok(),
                "{} failed",
                item.key
            );
            assert_eq!(mock.queries().len(), 1);
        }
    }
}
