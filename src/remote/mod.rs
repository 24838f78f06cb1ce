// remotebackup/src/remote/mod.rs
pub(crate) mod command;
pub(crate) mod runner;
#[cfg(test)]
pub(crate) mod testing;

pub use command::{Invocation, ShellCommand};
pub use runner::{CommandOutput, ProcessRunner, SystemRunner};

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::errors::{AppError, Result};
use crate::utils::ensure_safe_identifier;

/// Privilege elevation wrapped around a remote command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Escalation {
    #[default]
    None,
    /// Plain `sudo`.
    Sudo,
    /// `sudo -u <user>`.
    SudoAs(String),
}

impl Escalation {
    /// Maps a `sudo_user` setting: absent disables escalation, empty means plain
    /// `sudo`, anything else names the target user.
    pub fn from_setting(sudo_user: Option<&str>) -> Result<Self> {
        match sudo_user.map(str::trim) {
            None => Ok(Escalation::None),
            Some("") => Ok(Escalation::Sudo),
            Some(user) => {
                ensure_safe_identifier("sudo user", user)?;
                Ok(Escalation::SudoAs(user.to_string()))
            }
        }
    }

    pub fn apply(&self, command: ShellCommand) -> ShellCommand {
        match self {
            Escalation::None => command,
            Escalation::Sudo => command.prefixed(["sudo".to_string()]),
            Escalation::SudoAs(user) => {
                command.prefixed(["sudo".to_string(), "-u".to_string(), user.clone()])
            }
        }
    }
}

/// Where remote commands go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
}

/// Runs commands locally or on a host through `ssh`, logging what it runs and
/// anything the process writes to stderr.
#[derive(Clone)]
pub struct RemoteExecutor {
    runner: Arc<dyn ProcessRunner>,
    ssh_program: String,
    target: RemoteTarget,
    timeout: Option<Duration>,
}

impl RemoteExecutor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        ssh_program: impl Into<String>,
        target: RemoteTarget,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            ssh_program: ssh_program.into(),
            target,
            timeout,
        }
    }

    /// `ssh -C [-l user] [-p port] host <command>`; the remote command travels as a
    /// single argument.
    pub fn ssh_invocation(&self, command: &ShellCommand) -> Invocation {
        let mut invocation = Invocation::new(self.ssh_program.clone()).arg("-C");
        if let Some(user) = &self.target.user {
            invocation = invocation.arg("-l").arg(user.clone());
        }
        if let Some(port) = self.target.port {
            invocation = invocation.arg("-p").arg(port.to_string());
        }
        invocation.arg(self.target.host.clone()).arg(command.render())
    }

    /// Runs a local process. Non-empty stderr is logged; only a non-zero exit fails.
    pub async fn run_local(&self, invocation: &Invocation, sink: Option<File>) -> Result<CommandOutput> {
        debug!(command = %invocation, "executing command");
        let output = self.runner.run(invocation, sink, self.timeout).await?;

        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            error!(command = %invocation, stderr = %stderr, "command wrote to stderr");
        }
        if !output.success() {
            return Err(AppError::Command {
                status: output.status_description(),
                stderr: stderr.to_string(),
            });
        }
        Ok(output)
    }

    pub async fn run_remote(&self, command: &ShellCommand, sink: Option<File>) -> Result<CommandOutput> {
        let invocation = self.ssh_invocation(command);
        self.run_local(&invocation, sink).await
    }
}
