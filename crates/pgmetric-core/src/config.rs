//! Connection configuration.
//!
//! Defaults follow the standard libpq environment variables:
//! - PGHOST (default: localhost)
//! - PGPORT (default: 5432)
//! - PGUSER (default: $USER)
//! - PGPASSWORD (default: empty)
//! - PGDATABASE (default: same as PGUSER)
//!
//! Per-call overrides come from item-key parameters: a non-empty connection
//! string replaces the configured one, a non-empty database name replaces
//! its `dbname=` token.

use crate::error::MetricError;

/// libpq-style connection settings for the query executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    connection_string: String,
}

impl ConnectionConfig {
    /// Builds a connection string from the process environment.
    pub fn from_env() -> Result<Self, MetricError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a connection string from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MetricError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = lookup("PGUSER")
            .or_else(|| lookup("USER"))
            .ok_or_else(|| MetricError::Connection("PGUSER or USER not set".to_string()))?;

        let host = lookup("PGHOST").unwrap_or_else(|| "localhost".to_string());
        let port = lookup("PGPORT").unwrap_or_else(|| "5432".to_string());
        let password = lookup("PGPASSWORD").unwrap_or_default();
        let database = lookup("PGDATABASE").unwrap_or_else(|| user.clone());

        let connection_string = if password.is_empty() {
            format!(
                "host={} port={} user={} dbname={}",
                host, port, user, database
            )
        } else {
            format!(
                "host={} port={} user={} password={} dbname={}",
                host, port, user, password, database
            )
        };

        Ok(Self { connection_string })
    }

    /// Uses an explicit connection string.
    pub fn with_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Applies per-call overrides. Empty values leave the setting unchanged.
    pub fn with_overrides(&self, connection_string: Option<&str>, database: Option<&str>) -> Self {
        let base = match connection_string {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => self.connection_string.clone(),
        };

        let connection_string = match database {
            Some(db) if !db.trim().is_empty() => set_dbname(&base, db.trim()),
            _ => base,
        };

        Self { connection_string }
    }
}

/// Sets the `dbname=` token of a key/value connection string, in place if
/// present, appended otherwise.
fn set_dbname(connection_string: &str, database: &str) -> String {
    let dbname = format!("dbname={database}");
    let mut tokens: Vec<&str> = connection_string.split_whitespace().collect();

    match tokens.iter().position(|t| t.starts_with("dbname=")) {
        Some(i) => tokens[i] = dbname.as_str(),
        None => tokens.push(dbname.as_str()),
    }

    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn from_lookup_applies_defaults() {
        let cfg = ConnectionConfig::from_lookup(lookup_from(&[("USER", "zabbix")])).unwrap();
        assert_eq!(
            cfg.connection_string(),
            "host=localhost port=5432 user=zabbix dbname=zabbix"
        );
    }

    #[test]
    fn from_lookup_prefers_pg_variables() {
        let cfg = ConnectionConfig::from_lookup(lookup_from(&[
            ("USER", "ignored"),
            ("PGUSER", "monitor"),
            ("PGHOST", "db1"),
            ("PGPORT", "6432"),
            ("PGPASSWORD", "secret"),
            ("PGDATABASE", "postgres"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.connection_string(),
            "host=db1 port=6432 user=monitor password=secret dbname=postgres"
        );
    }

    #[test]
    fn from_lookup_requires_a_user() {
        let err = ConnectionConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, MetricError::Connection(_)));
    }

    #[test]
    fn overrides_replace_connection_and_database() {
        let cfg = ConnectionConfig::with_connection_string("host=a user=u dbname=postgres");

        assert_eq!(cfg.with_overrides(None, None), cfg);
        assert_eq!(cfg.with_overrides(Some(""), Some("")), cfg);
        assert_eq!(
            cfg.with_overrides(None, Some("app")).connection_string(),
            "host=a user=u dbname=app"
        );
        assert_eq!(
            cfg.with_overrides(Some("host=b user=v"), Some("app"))
                .connection_string(),
            "host=b user=v dbname=app"
        );
    }

    #[test]
    fn set_dbname_replaces_in_place() {
        assert_eq!(
            set_dbname("host=localhost port=5432 user=app dbname=postgres", "mydb"),
            "host=localhost port=5432 user=app dbname=mydb"
        );
        assert_eq!(
            set_dbname("dbname=old host=localhost", "new"),
            "dbname=new host=localhost"
        );
    }

    #[test]
    fn set_dbname_appends_when_missing() {
        assert_eq!(
            set_dbname("host=localhost  user=app", "mydb"),
            "host=localhost user=app dbname=mydb"
        );
        assert_eq!(set_dbname("", "mydb"), "dbname=mydb");
    }
}
