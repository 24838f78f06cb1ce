// remotebackup/src/backup/mod.rs
pub(crate) mod artifact;
pub(crate) mod mysql;
pub(crate) mod orchestrator;
pub(crate) mod postgres;

use async_trait::async_trait;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{EngineKind, HostConfig, RawJsonConfig};
use crate::errors::{AppError, Result};
use crate::remote::{ProcessRunner, RemoteExecutor, RemoteTarget, ShellCommand};
use artifact::PendingArtifact;

pub use mysql::MySqlEngine;
pub use orchestrator::{RunOptions, RunSummary, build_engines, run_all};
pub use postgres::PostgresEngine;

/// Public entry point for the backup process: builds every engine the
/// configuration asks for and runs them in order.
pub async fn run_backup_flow(
    config: &RawJsonConfig,
    options: &RunOptions,
    runner: Arc<dyn ProcessRunner>,
    ssh_program: &str,
    cwd: &Path,
) -> anyhow::Result<RunSummary> {
    let engines = build_engines(config, options, runner, ssh_program, cwd)?;
    info!(engines = engines.len(), "starting backup run");
    Ok(run_all(&engines).await)
}

/// `<dest_root>/<host>/<engine>`; no two engines share a subtree.
pub fn destination_for(dest_root: &Path, host: &str, kind: EngineKind) -> PathBuf {
    dest_root.join(host).join(kind.name())
}

/// One unit of work inside an engine run, named in logs and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Globals,
    Discover,
    Database(String),
    AllDatabases,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Prepare => f.write_str("prepare"),
            Step::Globals => f.write_str("globals"),
            Step::Discover => f.write_str("discover"),
            Step::Database(name) => write!(f, "database {name}"),
            Step::AllDatabases => f.write_str("all-databases"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepFailure {
    pub step: Step,
    pub error: String,
}

/// Outcome of one engine run.
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub host: String,
    pub kind: EngineKind,
    pub artifacts: Vec<PathBuf>,
    pub failures: Vec<StepFailure>,
}

impl EngineReport {
    pub fn new(host: &str, kind: EngineKind) -> Self {
        Self {
            host: host.to_string(),
            kind,
            artifacts: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Records the outcome of a dump step; failures are logged at error.
    pub(crate) fn record(&mut self, step: Step, result: Result<PathBuf>) {
        match result {
            Ok(path) => self.artifacts.push(path),
            Err(e) => self.fail(step, e),
        }
    }

    pub(crate) fn fail(&mut self, step: Step, e: AppError) {
        error!(step = %step, error = %e, "backup step failed");
        self.failures.push(StepFailure {
            step,
            error: e.to_string(),
        });
    }
}

/// A database backup strategy bound to one host.
#[async_trait]
pub trait BackupEngine: Send + Sync {
    fn kind(&self) -> EngineKind;
    fn host(&self) -> &str;

    /// Runs every step once. `Err` means the engine could not start at all; step
    /// failures are collected in the report instead.
    async fn run(&self) -> Result<EngineReport>;
}

/// State and helpers shared by every strategy.
pub struct EngineBase {
    kind: EngineKind,
    config: HostConfig,
    dest: PathBuf,
    executor: RemoteExecutor,
}

impl EngineBase {
    pub fn new(
        kind: EngineKind,
        config: HostConfig,
        runner: Arc<dyn ProcessRunner>,
        ssh_program: &str,
    ) -> Self {
        let dest = destination_for(&config.dest_root, &config.host, kind);
        let target = RemoteTarget {
            host: config.host.clone(),
            user: config.user.clone(),
            port: config.ssh_port,
        };
        let executor = RemoteExecutor::new(runner, ssh_program, target, config.timeout);
        Self {
            kind,
            config,
            dest,
            executor,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn remote(&self) -> &RemoteExecutor {
        &self.executor
    }

    pub fn escalate(&self, command: ShellCommand) -> ShellCommand {
        self.config.escalation.apply(command)
    }

    /// Creates the destination tree if needed. Safe to call repeatedly.
    pub fn ensure_destination(&self) -> Result<()> {
        fs::create_dir_all(&self.dest)?;
        Ok(())
    }

    /// `<dest>/<stem>.<compression>`
    pub fn artifact_path(&self, stem: &str) -> PathBuf {
        self.dest.join(format!("{stem}.{}", self.config.compression))
    }

    pub fn set_permissions(&self, path: &Path) -> Result<()> {
        artifact::set_permissions(path, self.config.file_mode)
    }

    /// Streams the remote command's stdout into `<stem>.<compression>`.
    ///
    /// The file mode is applied to the complete dump before it takes its final
    /// name, so a failed chmod leaves no artifact behind.
    pub async fn dump_to_artifact(&self, stem: &str, command: &ShellCommand) -> Result<PathBuf> {
        let pending = PendingArtifact::create(self.artifact_path(stem))?;
        self.executor.run_remote(command, Some(pending.sink()?)).await?;
        self.set_permissions(pending.path())?;
        let path = pending.commit()?;
        info!(artifact = %path.display(), "artifact written");
        Ok(path)
    }
}

/// The closed set of strategies.
pub enum Engine {
    Postgres(PostgresEngine),
    MySql(MySqlEngine),
}

impl Engine {
    pub fn new(
        kind: EngineKind,
        config: HostConfig,
        runner: Arc<dyn ProcessRunner>,
        ssh_program: &str,
    ) -> Self {
        let base = EngineBase::new(kind, config, runner, ssh_program);
        match kind {
            EngineKind::Postgres => Engine::Postgres(PostgresEngine::new(base)),
            EngineKind::MySql => Engine::MySql(MySqlEngine::new(base)),
        }
    }

    pub fn dest(&self) -> &Path {
        match self {
            Engine::Postgres(engine) => engine.base().dest(),
            Engine::MySql(engine) => engine.base().dest(),
        }
    }
}

#[async_trait]
impl BackupEngine for Engine {
    fn kind(&self) -> EngineKind {
        match self {
            Engine::Postgres(engine) => engine.kind(),
            Engine::MySql(engine) => engine.kind(),
        }
    }

    fn host(&self) -> &str {
        match self {
            Engine::Postgres(engine) => engine.host(),
            Engine::MySql(engine) => engine.host(),
        }
    }

    async fn run(&self) -> Result<EngineReport> {
        match self {
            Engine::Postgres(engine) => engine.run().await,
            Engine::MySql(engine) => engine.run().await,
        }
    }
}
