// remotebackup/src/remote/testing.rs
use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use super::command::Invocation;
use super::runner::{CommandOutput, ProcessRunner};
use crate::errors::Result;

struct Response {
    pattern: String,
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: String,
}

/// In-memory runner for tests. Replies to invocations whose rendered command line
/// contains a registered pattern (first match wins) and succeeds silently otherwise.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<Vec<Response>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn respond(&self, pattern: &str, exit_code: i32, stdout: &[u8], stderr: &str) {
        self.responses.lock().unwrap().push(Response {
            pattern: pattern.to_string(),
            exit_code,
            stdout: stdout.to_vec(),
            stderr: stderr.to_string(),
        });
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// The remote command strings (last ssh argument) in call order.
    pub fn remote_commands(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|inv| inv.args.last().cloned())
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        stdout: Option<File>,
        _limit: Option<Duration>,
    ) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let rendered = invocation.to_string();

        let (exit_code, bytes, stderr) = {
            let responses = self.responses.lock().unwrap();
            match responses.iter().find(|r| rendered.contains(&r.pattern)) {
                Some(r) => (r.exit_code, r.stdout.clone(), r.stderr.clone()),
                None => (0, b"dump".to_vec(), String::new()),
            }
        };

        let captured = match stdout {
            Some(mut file) => {
                file.write_all(&bytes)?;
                Vec::new()
            }
            None => bytes,
        };

        Ok(CommandOutput {
            exit_code: Some(exit_code),
            stdout: captured,
            stderr,
        })
    }
}
