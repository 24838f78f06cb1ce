// remotebackup/src/backup/mysql.rs
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::{BackupEngine, EngineBase, EngineReport, Step};
use crate::config::EngineKind;
use crate::errors::Result;
use crate::remote::ShellCommand;

const ALL_DATABASES_STEM: &str = "mysqldumpall.sql";

/// One `mysqldump --all-databases` artifact per host.
pub struct MySqlEngine {
    base: EngineBase,
}

impl MySqlEngine {
    pub fn new(base: EngineBase) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &EngineBase {
        &self.base
    }

    fn dump_command(&self) -> Result<ShellCommand> {
        let mut dump = ShellCommand::new("mysqldump");
        if let Some(user) = &self.base.config().mysql_user {
            dump = dump.arg("-u").value("mysql user", user)?;
        }
        let dump = dump.arg("--all-databases");
        self.base.escalate(dump).pipe_to(&self.base.config().compression)
    }

    pub async fn backup_all_databases(&self) -> Result<PathBuf> {
        info!(step = "all-databases", "backing up all mysql databases");
        let command = self.dump_command()?;
        self.base.dump_to_artifact(ALL_DATABASES_STEM, &command).await
    }
}

#[async_trait]
impl BackupEngine for MySqlEngine {
    fn kind(&self) -> EngineKind {
        self.base.kind()
    }

    fn host(&self) -> &str {
        &self.base.config().host
    }

    async fn run(&self) -> Result<EngineReport> {
        self.base.ensure_destination()?;
        let mut report = EngineReport::new(self.host(), self.kind());
        report.record(Step::AllDatabases, self.backup_all_databases().await);
        Ok(report)
    }
}
