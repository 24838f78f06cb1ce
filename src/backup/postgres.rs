// remotebackup/src/backup/postgres.rs
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use super::{BackupEngine, EngineBase, EngineReport, Step};
use crate::config::{EngineKind, GLOBALS_STEM};
use crate::errors::{AppError, Result};
use crate::remote::ShellCommand;

/// Never backed up when the database set comes from discovery.
pub const IGNORED_DATABASES: &[&str] = &["template0"];

/// Dumps cluster globals, then every database to its own artifact.
pub struct PostgresEngine {
    base: EngineBase,
}

impl PostgresEngine {
    pub fn new(base: EngineBase) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &EngineBase {
        &self.base
    }

    /// `psql -l`; the table is filtered locally by [`parse_database_listing`] so the
    /// exit status is psql's own.
    fn discovery_command(&self) -> ShellCommand {
        self.base.escalate(ShellCommand::new("psql").arg("-l"))
    }

    fn globals_command(&self) -> Result<ShellCommand> {
        let dump = ShellCommand::new("pg_dumpall").arg("--globals-only");
        self.base.escalate(dump).pipe_to(&self.base.config().compression)
    }

    fn database_command(&self, database: &str) -> Result<ShellCommand> {
        let dump = ShellCommand::new("pg_dump").arg("-i").value("database", database)?;
        self.base.escalate(dump).pipe_to(&self.base.config().compression)
    }

    /// The configured allowlist verbatim, or the discovered set minus
    /// [`IGNORED_DATABASES`].
    pub async fn resolve_databases(&self) -> Result<Vec<String>> {
        let configured = &self.base.config().databases;
        if !configured.is_empty() {
            return Ok(configured.clone());
        }

        let output = self.base.remote().run_remote(&self.discovery_command(), None).await?;
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(filter_ignored(parse_database_listing(&listing)))
    }

    pub async fn backup_globals(&self) -> Result<PathBuf> {
        info!(step = "globals", "backing up postgres globals");
        let command = self.globals_command()?;
        self.base.dump_to_artifact(GLOBALS_STEM, &command).await
    }

    pub async fn backup_database(&self, database: &str) -> Result<PathBuf> {
        info!(step = "database", database = %database, "backing up database");
        if database == GLOBALS_STEM {
            return Err(AppError::InvalidInput(format!(
                "database {database:?} would overwrite the cluster globals artifact"
            )));
        }
        let command = self.database_command(database)?;
        self.base.dump_to_artifact(database, &command).await
    }
}

/// Database names from `psql -l` output.
///
/// Data rows start with exactly one space; the name is their first
/// whitespace-separated field. Headers, separators, continuation rows of the
/// access privileges column and the row count are skipped, as are repeats.
pub fn parse_database_listing(listing: &str) -> Vec<String> {
    let mut databases: Vec<String> = Vec::new();
    for line in listing.lines() {
        let Some(rest) = line.strip_prefix(' ') else {
            continue;
        };
        if rest.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(name) = rest.split_whitespace().next() else {
            continue;
        };
        if !databases.iter().any(|known| known == name) {
            databases.push(name.to_string());
        }
    }
    databases
}

pub fn filter_ignored(databases: Vec<String>) -> Vec<String> {
    databases
        .into_iter()
        .filter(|name| !IGNORED_DATABASES.contains(&name.as_str()))
        .collect()
}

#[async_trait]
impl BackupEngine for PostgresEngine {
    fn kind(&self) -> EngineKind {
        self.base.kind()
    }

    fn host(&self) -> &str {
        &self.base.config().host
    }

    /// globals, then database discovery, then one dump per database. Each step is
    /// independent: a failure is recorded and the run moves on.
    async fn run(&self) -> Result<EngineReport> {
        self.base.ensure_destination()?;
        let mut report = EngineReport::new(self.host(), self.kind());

        report.record(Step::Globals, self.backup_globals().await);

        let databases = match self.resolve_databases().await {
            Ok(databases) => databases,
            Err(e) => {
                report.fail(Step::Discover, e);
                return Ok(report);
            }
        };
        debug!(databases = ?databases, "resolved databases");

        for database in &databases {
            let result = self.backup_database(database).await;
            report.record(Step::Database(database.clone()), result);
        }
        Ok(report)
    }
}
