// remotebackup/src/remote/runner.rs
use async_trait::async_trait;
use std::fs::File;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use super::command::Invocation;
use crate::errors::{AppError, Result};

/// What a finished process left behind.
///
/// `stdout` is empty when it was redirected into a file.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status_description(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Spawns processes. The seam between the engines and the operating system.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `invocation` to completion.
    ///
    /// With `stdout` set, the child's standard output is attached to that file.
    /// Otherwise it is captured. A non-zero exit is reported through
    /// [`CommandOutput::exit_code`], not as an error.
    async fn run(
        &self,
        invocation: &Invocation,
        stdout: Option<File>,
        limit: Option<Duration>,
    ) -> Result<CommandOutput>;
}

/// Runs processes on the local machine with `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        stdout: Option<File>,
        limit: Option<Duration>,
    ) -> Result<CommandOutput> {
        let stdout = match stdout {
            Some(file) => Stdio::from(file),
            None => Stdio::piped(),
        };

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AppError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        // Dropping the pending wait on timeout drops the child, which kills it.
        let output = match limit {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| AppError::Cancelled(limit))??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn test_system_runner_captures_output() -> anyhow::Result<()> {
        let inv = Invocation::new("sh").arg("-c").arg("echo out; echo err >&2; exit 3");
        let output = SystemRunner.run(&inv, None, None).await?;
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout), "out\n");
        assert_eq!(output.stderr, "err\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_system_runner_writes_stdout_to_file() -> anyhow::Result<()> {
        let mut file = tempfile::tempfile()?;
        let inv = Invocation::new("sh").arg("-c").arg("printf dump");
        let output = SystemRunner.run(&inv, Some(file.try_clone()?), None).await?;
        assert!(output.success());
        assert!(output.stdout.is_empty());

        use std::io::{Seek, SeekFrom};
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        assert_eq!(contents, "dump");
        Ok(())
    }

    #[tokio::test]
    async fn test_system_runner_times_out() {
        let inv = Invocation::new("sleep").arg("5");
        let result = SystemRunner.run(&inv, None, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_system_runner_reports_spawn_failure() {
        let inv = Invocation::new("/nonexistent/definitely-not-ssh");
        let result = SystemRunner.run(&inv, None, None).await;
        assert!(matches!(result, Err(AppError::Spawn { .. })));
    }
}
