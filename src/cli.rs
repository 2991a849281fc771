//! CLI interface for Logship.
//!
//! Each subcommand is non-interactive: arguments in, JSON out on stdout.
//! Logs and errors go to stderr.
//!
//! - `logship fetch-logs job|agent [--filter <glob>]...`: package and upload logs.
//! - `logship run <action> [<json-args>]`: dispatch any registered action by name.
//! - `logship get <blob-id> <dest>`: download a blob.
//! - `logship services <group>`: report a monit group's services.

use std::{
    error::Error,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use crate::{
    action::{FETCH_LOGS, LogsAction},
    blobstore::{Blobstore, ExternalBlobstore, LocalBlobstore},
    compressor::TarballCompressor,
    config::{BlobstoreConfig, Config},
    dispatch::{DispatchError, Dispatched, Dispatcher},
    monitor::{MonitStatus, StatusProvider},
};

/// Logship: collect host logs and deliver them to a blobstore.
#[derive(Debug, Parser)]
#[command(name = "logship", after_long_help = USAGE_HELP)]
pub struct Cli {
    /// Config file (default: `~/.logship/config.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const USAGE_HELP: &str = r#"Examples:
  logship fetch-logs job
  logship fetch-logs agent --filter 'current' --filter '**/*.err'
  logship run fetch_logs '["job", ["nats/*.log"]]'
  logship get 3f0c7a52-0a51-4a34-9f3e-5c1b1c9e2d10 ./logs.tar.zst
  logship services vcap"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Package logs and upload them. Prints `{"blobstore_id": "..."}`.
    ///
    /// Without `--filter`, job logs default to `**/*.log` and agent logs to `**/*`.
    FetchLogs {
        /// Which logs: `job` or `agent`.
        log_type: String,

        /// Glob relative to the log directory. Can be specified multiple times.
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Dispatch a registered action by name.
    Run {
        /// Action name (e.g. `fetch_logs`).
        action: String,

        /// Arguments as a JSON array.
        #[arg(default_value = "[]")]
        args: String,
    },

    /// Download a blob to a local file.
    Get {
        blob_id: String,
        destination: PathBuf,
    },

    /// List the services in a monit group with their status.
    Services {
        group: String,

        /// Status snapshot to read instead of the configured one.
        #[arg(long)]
        status: Option<PathBuf>,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli, config: &Config) -> Result<(), String> {
    match cli.command {
        Command::FetchLogs { log_type, filters } => {
            cmd_dispatch(config, FETCH_LOGS, vec![json!(log_type), json!(filters)])
        }
        Command::Run { action, args } => cmd_dispatch(config, &action, parse_args(&args)?),
        Command::Get {
            blob_id,
            destination,
        } => cmd_get(config, &blob_id, &destination),
        Command::Services { group, status } => cmd_services(config, &group, status),
    }
}

/// Build the dispatcher with every action this agent supports.
pub fn dispatcher(config: &Config) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(
        FETCH_LOGS,
        LogsAction::new(
            TarballCompressor::new(config.tmp_dir()),
            blobstore(config),
            config.base_dir(),
        ),
    );
    dispatcher
}

fn blobstore(config: &Config) -> Box<dyn Blobstore> {
    match config.blobstore() {
        BlobstoreConfig::Local { path } => Box::new(LocalBlobstore::new(path)),
        BlobstoreConfig::External { command, config } => {
            Box::new(ExternalBlobstore::new(command, config))
        }
    }
}

fn cmd_dispatch(config: &Config, action: &str, args: Vec<Value>) -> Result<(), String> {
    let value = dispatcher(config)
        .dispatch(action, args)
        .and_then(Dispatched::wait)
        .map_err(|e| match &e {
            DispatchError::Action(action_err) if action_err.is_retryable() => {
                format!("{} (retryable)", error_chain(&e))
            }
            _ => error_chain(&e),
        })?;
    print_json(&value)
}

fn cmd_get(config: &Config, blob_id: &str, destination: &Path) -> Result<(), String> {
    blobstore(config)
        .get(blob_id, destination)
        .map_err(|e| error_chain(&e))?;
    println!("{}", destination.display());
    Ok(())
}

fn cmd_services(config: &Config, group: &str, status: Option<PathBuf>) -> Result<(), String> {
    let path = status.unwrap_or_else(|| config.monit_status_file());
    let snapshot = MonitStatus::load(&path).map_err(|e| error_chain(&e))?;
    let services = snapshot.services_in_group(group);
    tracing::info!(
        group,
        total = services.len(),
        running = services.iter().filter(|s| s.is_running()).count(),
        "read service status"
    );
    print_json(&json!(services))
}

/// Parse the `run` arguments: a JSON array.
fn parse_args(raw: &str) -> Result<Vec<Value>, String> {
    match serde_json::from_str(raw) {
        Ok(Value::Array(args)) => Ok(args),
        Ok(_) => Err("arguments must be a JSON array".to_string()),
        Err(e) => Err(format!("invalid JSON arguments: {e}")),
    }
}

fn print_json(value: &Value) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("failed to serialize result: {e}"))?;
    println!("{json}");
    Ok(())
}

/// Render an error and its causes as `outer: inner: root`.
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
