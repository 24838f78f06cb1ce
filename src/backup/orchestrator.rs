// remotebackup/src/backup/orchestrator.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeDelta};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span};

use super::{BackupEngine, Engine, EngineReport, Step};
use crate::config::{
    DEFAULT_COMPRESSION, DEFAULT_FILE_MODE, EngineKind, HostConfig, JsonHostConfig, RawJsonConfig,
    mysql_requested, parse_database_list, parse_file_mode,
};
use crate::errors::AppError;
use crate::remote::{Escalation, ProcessRunner};
use crate::utils::ensure_safe_identifier;

/// Run-wide switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restricts the run to these hosts when non-empty.
    pub only_hosts: Vec<String>,
    /// Replaces every host's configured timeout.
    pub timeout: Option<Duration>,
}

struct Defaults {
    compression: String,
    dest: PathBuf,
    file_mode: u32,
    timeout_secs: Option<u64>,
}

/// Builds one engine per (host, strategy) pair, in configuration order.
///
/// Host values override the `default` section; `postgres_sudo_user` overrides
/// `sudo_user` for the PostgreSQL engine only. Fails when the configuration is
/// invalid or no host asks for any backup.
pub fn build_engines(
    config: &RawJsonConfig,
    options: &RunOptions,
    runner: Arc<dyn ProcessRunner>,
    ssh_program: &str,
    cwd: &Path,
) -> Result<Vec<Engine>> {
    let defaults = Defaults {
        compression: config
            .default
            .compression
            .clone()
            .unwrap_or_else(|| DEFAULT_COMPRESSION.to_string()),
        dest: config.default.dest.clone().unwrap_or_else(|| cwd.to_path_buf()),
        file_mode: match &config.default.fmod {
            Some(fmod) => parse_file_mode(fmod).context("Invalid fmod in default section")?,
            None => DEFAULT_FILE_MODE,
        },
        timeout_secs: config.default.timeout_secs,
    };

    for wanted in &options.only_hosts {
        if !config.hosts.iter().any(|h| &h.host == wanted) {
            return Err(AppError::Config(format!("host {wanted} is not in the configuration")).into());
        }
    }

    let mut engines = Vec::new();
    for host in &config.hosts {
        if !options.only_hosts.is_empty() && !options.only_hosts.contains(&host.host) {
            continue;
        }
        let host_engines = engines_for_host(host, &defaults, options, &runner, ssh_program)
            .with_context(|| format!("Invalid configuration for host {}", host.host))?;
        engines.extend(host_engines);
    }

    if engines.is_empty() {
        return Err(AppError::Config(
            "no host requests a postgres or mysql backup".to_string(),
        )
        .into());
    }

    let mut destinations = HashSet::new();
    for engine in &engines {
        if !destinations.insert(engine.dest().to_path_buf()) {
            return Err(AppError::Config(format!(
                "more than one engine writes to {}",
                engine.dest().display()
            ))
            .into());
        }
    }

    Ok(engines)
}

fn engines_for_host(
    host: &JsonHostConfig,
    defaults: &Defaults,
    options: &RunOptions,
    runner: &Arc<dyn ProcessRunner>,
    ssh_program: &str,
) -> Result<Vec<Engine>> {
    let wants_postgres = host.postgres.is_some();
    let wants_mysql = mysql_requested(host.mysql.as_ref());
    if !wants_postgres && !wants_mysql {
        debug!(host = %host.host, "no backup requested, skipping host");
        return Ok(Vec::new());
    }

    ensure_safe_identifier("host", &host.host)?;
    if let Some(user) = &host.user {
        ensure_safe_identifier("ssh user", user)?;
    }
    if let Some(user) = &host.mysql_user {
        ensure_safe_identifier("mysql user", user)?;
    }
    let compression = host.compression.clone().unwrap_or_else(|| defaults.compression.clone());
    ensure_safe_identifier("compression program", &compression)?;
    let file_mode = match &host.fmod {
        Some(fmod) => parse_file_mode(fmod)?,
        None => defaults.file_mode,
    };
    let timeout = options
        .timeout
        .or_else(|| host.timeout_secs.or(defaults.timeout_secs).map(Duration::from_secs));

    let dest_root = host.dest.clone().unwrap_or_else(|| defaults.dest.clone());
    let shared = HostConfig {
        user: host.user.clone(),
        ssh_port: host.ssh_port,
        escalation: Escalation::from_setting(host.sudo_user.as_deref())?,
        compression,
        file_mode,
        mysql_user: host.mysql_user.clone(),
        timeout,
        ..HostConfig::new(host.host.clone(), dest_root)
    };

    let mut engines = Vec::new();
    if let Some(value) = &host.postgres {
        let mut postgres = shared.clone();
        postgres.databases = parse_database_list(value)?;
        if let Some(sudo_user) = &host.postgres_sudo_user {
            postgres.escalation = Escalation::from_setting(Some(sudo_user))?;
        }
        engines.push(Engine::new(EngineKind::Postgres, postgres, runner.clone(), ssh_program));
    }
    if wants_mysql {
        engines.push(Engine::new(EngineKind::MySql, shared, runner.clone(), ssh_program));
    }
    Ok(engines)
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub elapsed: TimeDelta,
    pub reports: Vec<EngineReport>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|r| !r.succeeded())
    }

    pub fn failed_steps(&self) -> usize {
        self.reports.iter().map(|r| r.failures.len()).sum()
    }

    /// One line for the whole run. Individual failures were logged as they happened.
    pub fn log(&self) {
        let artifacts: usize = self.reports.iter().map(|r| r.artifacts.len()).sum();
        if self.has_failures() {
            error!(
                started_at = %self.started_at.to_rfc3339(),
                elapsed_secs = self.elapsed.num_seconds(),
                engines = self.reports.len(),
                artifacts,
                failed_steps = self.failed_steps(),
                "backup run finished with failures"
            );
        } else {
            info!(
                started_at = %self.started_at.to_rfc3339(),
                elapsed_secs = self.elapsed.num_seconds(),
                engines = self.reports.len(),
                artifacts,
                "backup run finished"
            );
        }
    }
}

/// Runs the engines one after another. A failing engine is recorded and the rest
/// still run.
pub async fn run_all(engines: &[Engine]) -> RunSummary {
    let started_at = Local::now();
    let mut reports = Vec::with_capacity(engines.len());

    for engine in engines {
        let span = info_span!("engine", host = %engine.host(), engine = %engine.kind());
        let report = async {
            info!(dest = %engine.dest().display(), "backing up host");
            match engine.run().await {
                Ok(report) => report,
                Err(e) => {
                    let mut report = EngineReport::new(engine.host(), engine.kind());
                    report.fail(Step::Prepare, e);
                    report
                }
            }
        }
        .instrument(span)
        .await;
        reports.push(report);
    }

    RunSummary {
        started_at,
        elapsed: Local::now() - started_at,
        reports,
    }
}
