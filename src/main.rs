//! Remote Database Backup Tool
//!
//! Dumps PostgreSQL and MySQL servers over ssh into a local directory tree,
//! one engine per configured host and strategy.

// remotebackup/src/main.rs
mod backup;
mod config;
mod errors;
mod remote;
mod utils;

use anyhow::{Context, Result};
use backup::{RunOptions, RunSummary};
use clap::Parser;
use config::RawJsonConfig;
use remote::SystemRunner;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Back up remote PostgreSQL and MySQL servers over ssh")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(env = "BACKUP_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Only back up these hosts (repeatable)
    #[arg(long = "only", value_name = "HOST")]
    only: Vec<String>,

    /// Per-command timeout in seconds, overriding the configuration
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log every command line
    #[arg(short, long)]
    verbose: bool,
}

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_app(cli).await {
        Ok(summary) => {
            summary.log();
            if summary.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = ?e, "backup run aborted");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_app(cli: Cli) -> Result<RunSummary> {
    let config = RawJsonConfig::load_from_json(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    info!(config = %cli.config.display(), hosts = config.hosts.len(), "configuration loaded");

    let ssh = utils::find_ssh_executable()?;
    let cwd = env::current_dir().context("Failed to determine the working directory")?;
    let options = RunOptions {
        only_hosts: cli.only,
        timeout: cli.timeout.map(Duration::from_secs),
    };

    backup::run_backup_flow(
        &config,
        &options,
        Arc::new(SystemRunner),
        &ssh.to_string_lossy(),
        &cwd,
    )
    .await
}
