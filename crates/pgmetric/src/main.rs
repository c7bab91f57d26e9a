//! pgmetric - PostgreSQL background-writer metrics for a polling agent.
//!
//! Evaluates agent item keys (e.g. `pg.checkpoint_time_ratio[,,write]`)
//! against a PostgreSQL server and prints their values on stdout.
//! Logs go to stderr.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use pgmetric_core::config::ConnectionConfig;
use pgmetric_core::handlers::{ITEM_KEYS, handle};
use pgmetric_core::request::AgentRequest;
use pgmetric_core::{
    AgentResult, ErrorReporter, MetricValue, PostgresExecutor, QueryExecutor, ValueType,
};

/// PostgreSQL background-writer metrics.
#[derive(Parser)]
#[command(
    name = "pgmetric",
    about = "PostgreSQL background-writer metrics",
    version = pgmetric_core::VERSION
)]
struct Args {
    /// libpq connection string. Defaults to PGHOST/PGPORT/PGUSER/PGPASSWORD/PGDATABASE.
    /// A non-empty first item-key parameter overrides it per key.
    #[arg(long, env = "PGMETRIC_CONNECTION")]
    connection: Option<String>,

    /// Print one JSON object per key instead of bare values.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace).
    /// Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one or more item keys.
    Get {
        /// Item keys, e.g. `pg.buffers_clean` or `pg.checkpoint_time_ratio[,,sync]`.
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List supported item keys.
    Keys,
    /// Connect and print the server version number.
    Ping,
}

/// One line of `--json` output.
#[derive(Serialize)]
struct KeyOutput<'a> {
    key: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    value_type: Option<ValueType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a MetricValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

impl<'a> KeyOutput<'a> {
    fn new(key: &'a str, result: &'a AgentResult) -> Self {
        Self {
            key,
            value_type: result.value().map(MetricValue::value_type),
            value: result.value(),
            error: result.error(),
        }
    }
}

/// Initializes the tracing subscriber on stderr.
/// Default level is WARN so stdout/stderr stay clean for the agent. Use -q for errors only.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for directive in [
        format!("pgmetric={}", level),
        format!("pgmetric_core={}", level),
    ] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn connection_config(connection: Option<String>) -> ConnectionConfig {
    match connection {
        Some(s) => ConnectionConfig::with_connection_string(s),
        None => ConnectionConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "no default connection; item keys must carry a connection string");
            ConnectionConfig::with_connection_string("")
        }),
    }
}

fn print_result(key: &str, result: &AgentResult, json: bool) {
    if json {
        match serde_json::to_string(&KeyOutput::new(key, result)) {
            Ok(line) => println!("{}", line),
            Err(e) => error!(key, error = %e, "failed to serialize result"),
        }
        return;
    }

    match (result.value(), result.error()) {
        (Some(value), _) => println!("{}", value),
        (None, Some(msg)) => {
            println!();
            eprintln!("pgmetric: {}: {}", key, msg);
        }
        (None, None) => println!(),
    }
}

fn run_get(keys: &[String], config: &ConnectionConfig, json: bool) -> ExitCode {
    let mut executor = PostgresExecutor::new();
    let mut failed = 0usize;

    for key in keys {
        let result = match AgentRequest::parse(key) {
            Ok(request) => handle(&mut executor, config, &request),
            Err(e) => {
                let mut result = AgentResult::default();
                result.report_error(&e.to_string());
                result
            }
        };

        if result.is_error() {
            failed += 1;
        }
        print_result(key, &result, json);
    }

    if failed > 0 {
        info!(failed, total = keys.len(), "some keys failed");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_keys(json: bool) -> ExitCode {
    for item in ITEM_KEYS {
        if json {
            let line = serde_json::json!({ "key": item.key, "description": item.description });
            println!("{}", line);
        } else {
            println!("{:<30} {}", item.key, item.description);
        }
    }
    ExitCode::SUCCESS
}

fn run_ping(config: &ConnectionConfig) -> ExitCode {
    let mut executor = PostgresExecutor::new();
    match executor.server_version_num(config) {
        Ok(version) => {
            match version {
                Some(v) => println!("{}", v),
                None => println!("unknown"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "connection check failed");
            eprintln!("pgmetric: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = connection_config(args.connection);

    match args.command {
        Command::Get { keys } => run_get(&keys, &config, args.json),
        Command::Keys => run_keys(args.json),
        Command::Ping => run_ping(&config),
    }
}
