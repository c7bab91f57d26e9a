//! Metric resolution: maps a requested metric to SQL text and a declared type.
//!
//! PG < 17: all counters live in `pg_stat_bgwriter`.
//! PG 17+:  checkpoint counters moved to `pg_stat_checkpointer` under new names,
//!          `buffers_backend`/`buffers_backend_fsync` were dropped (moved to pg_stat_io).
//!
//! Field names requested by the agent are always the legacy (pre-17) names.

use std::str::FromStr;

use crate::error::MetricError;
use crate::metric::{MetricRequest, QuerySpec, ValueType};

/// Background-writer statistics view.
pub const BGWRITER_VIEW: &str = "pg_stat_bgwriter";

/// Checkpointer statistics view (PG 17+).
pub const CHECKPOINTER_VIEW: &str = "pg_stat_checkpointer";

/// First server version that splits checkpoint counters into `pg_stat_checkpointer`.
const CHECKPOINTER_SPLIT_VERSION: i32 = 170000;

/// Derived metric names accepted by [`MetricResolver::resolve`].
pub const STATS_RESET_INTERVAL: &str = "stats_reset_interval";
pub const CHECKPOINT_AVG_INTERVAL: &str = "checkpoint_avg_interval";
pub const CHECKPOINT_TIME_RATIO: &str = "checkpoint_time_ratio";

/// Field classification rules, evaluated top to bottom. First prefix match wins.
pub const FIELD_TYPE_RULES: &[(&str, ValueType)] = &[
    ("checkpoint_", ValueType::Float),
    ("stats_reset", ValueType::String),
];

/// Type of any field not matched by [`FIELD_TYPE_RULES`].
pub const DEFAULT_FIELD_TYPE: ValueType = ValueType::Integer;

/// Returns the declared type of a statistics view column by name.
pub fn classify_field(field: &str) -> ValueType {
    FIELD_TYPE_RULES
        .iter()
        .find(|(prefix, _)| field.starts_with(prefix))
        .map(|(_, value_type)| *value_type)
        .unwrap_or(DEFAULT_FIELD_TYPE)
}

/// Where the checkpoint counters are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CheckpointColumns {
    view: &'static str,
    timed: &'static str,
    requested: &'static str,
    write_time: &'static str,
    sync_time: &'static str,
}

const LEGACY_COLUMNS: CheckpointColumns = CheckpointColumns {
    view: BGWRITER_VIEW,
    timed: "checkpoints_timed",
    requested: "checkpoints_req",
    write_time: "checkpoint_write_time",
    sync_time: "checkpoint_sync_time",
};

const CHECKPOINTER_COLUMNS: CheckpointColumns = CheckpointColumns {
    view: CHECKPOINTER_VIEW,
    timed: "num_timed",
    requested: "num_requested",
    write_time: "write_time",
    sync_time: "sync_time",
};

/// Legacy bgwriter field names and their PG 17+ `pg_stat_checkpointer` columns.
const CHECKPOINTER_FIELD_MAP: &[(&str, &str)] = &[
    ("checkpoints_timed", "num_timed"),
    ("checkpoints_req", "num_requested"),
    ("checkpoint_write_time", "write_time"),
    ("checkpoint_sync_time", "sync_time"),
    ("buffers_checkpoint", "buffers_written"),
];

/// Legacy bgwriter fields with no PG 17+ counterpart. Reported as 0.
const REMOVED_FIELDS: &[&str] = &["buffers_backend", "buffers_backend_fsync"];

/// Counter selection for the checkpoint time ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRatioAction {
    /// Write time plus sync time.
    #[default]
    All,
    Write,
    Sync,
}

impl TimeRatioAction {
    /// Parses an optional action parameter. Absent (or empty) means `All`.
    pub fn parse(action: Option<&str>) -> Result<Self, MetricError> {
        match action {
            None | Some("") => Ok(Self::All),
            Some(s) => s.parse(),
        }
    }

    fn counter_expr(self, columns: &CheckpointColumns) -> String {
        match self {
            Self::All => format!("({} + {})", columns.write_time, columns.sync_time),
            Self::Write => columns.write_time.to_string(),
            Self::Sync => columns.sync_time.to_string(),
        }
    }
}

impl FromStr for TimeRatioAction {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "write" => Ok(Self::Write),
            "sync" => Ok(Self::Sync),
            other => Err(MetricError::InvalidParameter(other.to_string())),
        }
    }
}

/// Stateless mapping from a requested metric to a [`QuerySpec`].
///
/// The only state is the server version used to pick the statistics view,
/// fixed at construction. `MetricResolver::default()` targets pre-17 servers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricResolver {
    server_version_num: Option<i32>,
}

impl MetricResolver {
    pub fn new(server_version_num: Option<i32>) -> Self {
        Self { server_version_num }
    }

    fn has_checkpointer_view(&self) -> bool {
        self.server_version_num.unwrap_or(0) >= CHECKPOINTER_SPLIT_VERSION
    }

    fn checkpoint_columns(&self) -> CheckpointColumns {
        if self.has_checkpointer_view() {
            CHECKPOINTER_COLUMNS
        } else {
            LEGACY_COLUMNS
        }
    }

    /// Dispatches a request to one of the four resolve operations.
    ///
    /// Derived metric names are matched first; anything else is a field name.
    /// An empty metric name is rejected before any SQL is built.
    pub fn resolve(&self, request: &MetricRequest) -> Result<QuerySpec, MetricError> {
        match request.metric_name.as_str() {
            "" => Err(MetricError::InvalidKey("empty metric name".to_string())),
            STATS_RESET_INTERVAL => Ok(self.resolve_stats_reset_interval()),
            CHECKPOINT_AVG_INTERVAL => Ok(self.resolve_checkpoint_avg_interval()),
            CHECKPOINT_TIME_RATIO => {
                self.resolve_checkpoint_time_ratio(request.sub_parameter.as_deref())
            }
            field => Ok(self.resolve_field_metric(field)),
        }
    }

    /// Reads one column of the background-writer view.
    ///
    /// The field name is not validated here; an unknown column surfaces as a
    /// query error from the executor.
    pub fn resolve_field_metric(&self, field: &str) -> QuerySpec {
        let expected_type = classify_field(field);

        if self.has_checkpointer_view() {
            if let Some((_, column)) = CHECKPOINTER_FIELD_MAP.iter().find(|(f, _)| *f == field) {
                return QuerySpec::new(
                    format!("SELECT {column} AS {field} FROM {CHECKPOINTER_VIEW};"),
                    expected_type,
                );
            }
            if REMOVED_FIELDS.contains(&field) {
                return QuerySpec::new(format!("SELECT 0::bigint AS {field};"), expected_type);
            }
        }

        QuerySpec::new(format!("SELECT {field} FROM {BGWRITER_VIEW};"), expected_type)
    }

    /// Seconds elapsed since the background-writer statistics were last reset.
    pub fn resolve_stats_reset_interval(&self) -> QuerySpec {
        QuerySpec::new(
            format!(
                "SELECT EXTRACT(EPOCH FROM NOW() - stats_reset)::double precision \
                 FROM {BGWRITER_VIEW};"
            ),
            ValueType::Integer,
        )
    }

    /// Average seconds between checkpoints since the last reset; 0 when none ran.
    pub fn resolve_checkpoint_avg_interval(&self) -> QuerySpec {
        let c = self.checkpoint_columns();
        QuerySpec::new(
            format!(
                "SELECT CASE {timed} + {req} \
                 WHEN 0 THEN 0 \
                 ELSE EXTRACT(EPOCH FROM NOW() - stats_reset) / ({timed} + {req}) \
                 END::double precision FROM {view};",
                timed = c.timed,
                req = c.requested,
                view = c.view,
            ),
            ValueType::Float,
        )
    }

    /// Fraction of wall-clock time since the last reset spent in checkpoint I/O.
    ///
    /// The action is validated before any SQL is built. A zero elapsed time
    /// yields NULL (reported as an empty result), never a division error.
    pub fn resolve_checkpoint_time_ratio(
        &self,
        action: Option<&str>,
    ) -> Result<QuerySpec, MetricError> {
        let action = TimeRatioAction::parse(action)?;
        let c = self.checkpoint_columns();
        let counter = action.counter_expr(&c);

        Ok(QuerySpec::new(
            format!(
                "SELECT (({counter} / 1000) / \
                 NULLIF(EXTRACT(EPOCH FROM NOW() - stats_reset), 0))::double precision \
                 FROM {view};",
                view = c.view,
            ),
            ValueType::Float,
        ))
    }
}
