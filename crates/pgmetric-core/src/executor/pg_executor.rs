//! `QueryExecutor` backed by the synchronous `postgres` driver.

use chrono::{DateTime, NaiveDateTime, Utc};
use postgres::types::Type;
use postgres::{Client, NoTls, Row};
use tracing::{debug, info, warn};

use super::{QueryExecutor, ScalarValue};
use crate::config::ConnectionConfig;
use crate::error::MetricError;

/// Rendering used for timestamp columns returned as metric strings.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Executes queries over one lazily-established connection.
///
/// The connection is reused while the target connection string stays the
/// same and is re-established when it changes or the server drops it.
#[derive(Default)]
pub struct PostgresExecutor {
    client: Option<Client>,
    /// Connection string the current client was opened with.
    connected_to: Option<String>,
    server_version_num: Option<i32>,
}

impl std::fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresExecutor")
            .field("connected", &self.client.is_some())
            .field("server_version_num", &self.server_version_num)
            .finish_non_exhaustive()
    }
}

impl PostgresExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a live connection to `target`, reconnecting if needed.
    fn ensure_connected(
        &mut self,
        target: &ConnectionConfig,
    ) -> Result<&mut Client, MetricError> {
        let wanted = target.connection_string();
        let reusable = self.connected_to.as_deref() == Some(wanted)
            && self.client.as_ref().is_some_and(|c| !c.is_closed());

        if !reusable {
            self.disconnect();

            let mut client = Client::connect(wanted, NoTls)
                .map_err(|e| MetricError::Connection(describe_error(&e)))?;

            // Determine server version once per (re)connect.
            self.server_version_num = client
                .query_one("SHOW server_version_num", &[])
                .ok()
                .and_then(|row| row.try_get::<_, String>(0).ok())
                .and_then(|v| v.parse::<i32>().ok());

            info!(
                server_version_num = ?self.server_version_num,
                "connected to PostgreSQL"
            );

            self.client = Some(client);
            self.connected_to = Some(wanted.to_string());
        }

        self.client
            .as_mut()
            .ok_or_else(|| MetricError::Connection("connection unavailable".to_string()))
    }

    fn disconnect(&mut self) {
        self.client = None;
        self.connected_to = None;
        self.server_version_num = None;
    }
}

impl QueryExecutor for PostgresExecutor {
    fn execute(
        &mut self,
        sql: &str,
        target: &ConnectionConfig,
    ) -> Result<Option<ScalarValue>, MetricError> {
        let client = self.ensure_connected(target)?;
        debug!(query = sql, "executing metric query");

        let rows = match client.query(sql, &[]) {
            Ok(rows) => rows,
            Err(e) => {
                let msg = describe_error(&e);
                if client.is_closed() {
                    warn!(error = %msg, "connection lost");
                    self.disconnect();
                }
                return Err(MetricError::Query(msg));
            }
        };

        match rows.first() {
            Some(row) => decode_first_column(row),
            None => Ok(None),
        }
    }

    fn server_version_num(
        &mut self,
        target: &ConnectionConfig,
    ) -> Result<Option<i32>, MetricError> {
        self.ensure_connected(target)?;
        Ok(self.server_version_num)
    }
}

/// Decodes column 0 of `row` into a scalar, by its server-side type.
fn decode_first_column(row: &Row) -> Result<Option<ScalarValue>, MetricError> {
    let Some(column) = row.columns().first() else {
        return Err(MetricError::Query("query returned no columns".to_string()));
    };
    let ty = column.type_();

    let value = if *ty == Type::INT2 {
        get::<i16>(row)?.map(|n| ScalarValue::Integer(n.into()))
    } else if *ty == Type::INT4 {
        get::<i32>(row)?.map(|n| ScalarValue::Integer(n.into()))
    } else if *ty == Type::INT8 {
        get::<i64>(row)?.map(ScalarValue::Integer)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row)?.map(|x| ScalarValue::Float(x.into()))
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row)?.map(ScalarValue::Float)
    } else if [Type::TEXT, Type::VARCHAR, Type::NAME, Type::BPCHAR].contains(ty) {
        get::<String>(row)?.map(ScalarValue::Text)
    } else if *ty == Type::TIMESTAMPTZ {
        get::<DateTime<Utc>>(row)?
            .map(|ts| ScalarValue::Text(ts.format(TIMESTAMP_FORMAT).to_string()))
    } else if *ty == Type::TIMESTAMP {
        get::<NaiveDateTime>(row)?
            .map(|ts| ScalarValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
    } else {
        return Err(MetricError::Query(format!(
            "unsupported column type: {}",
            ty.name()
        )));
    };

    Ok(value)
}

fn get<'a, T>(row: &'a Row) -> Result<Option<T>, MetricError>
where
    T: postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(0)
        .map_err(|e| MetricError::Query(e.to_string()))
}

/// Renders a driver error as `SEVERITY [SQLSTATE]: message` for server-side
/// errors, or the driver's own description (which includes its cause) otherwise.
fn describe_error(e: &postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} [{}]: {}", db.severity(), db.code().code(), db.message()),
        None => e.to_string(),
    }
}
