// remotebackup/src/remote/command.rs
use std::fmt;

use crate::errors::Result;
use crate::utils::ensure_safe_identifier;

/// A command line for the remote shell.
///
/// Fixed program names, flags and pipeline fragments are `&'static str` and go in
/// unchecked. Anything that comes from configuration or from the remote host goes
/// through [`ShellCommand::value`], which refuses words the shell would interpret.
///
/// A command containing a pipe renders behind `set -o pipefail;` so a failing dump
/// binary fails the whole command instead of hiding behind the filter's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    words: Vec<String>,
    piped: bool,
}

const PIPEFAIL: &str = "set -o pipefail;";

impl ShellCommand {
    pub fn new(program: &'static str) -> Self {
        Self {
            words: vec![program.to_string()],
            piped: false,
        }
    }

    pub fn arg(mut self, literal: &'static str) -> Self {
        self.words.push(literal.to_string());
        self
    }

    /// Appends a configured or discovered value after validating it.
    pub fn value(mut self, kind: &str, value: &str) -> Result<Self> {
        ensure_safe_identifier(kind, value)?;
        self.words.push(value.to_string());
        Ok(self)
    }

    /// Pipes the output so far through `program` (e.g. the compression filter).
    pub fn pipe_to(mut self, program: &str) -> Result<Self> {
        ensure_safe_identifier("compression program", program)?;
        self.words.push("|".to_string());
        self.words.push(program.to_string());
        self.piped = true;
        Ok(self)
    }

    /// Puts `words` in front of the current command, as escalation does.
    pub(crate) fn prefixed<I>(self, words: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut prefixed: Vec<String> = words.into_iter().collect();
        prefixed.extend(self.words);
        Self {
            words: prefixed,
            piped: self.piped,
        }
    }

    pub fn render(&self) -> String {
        let line = self.words.join(" ");
        if self.piped {
            format!("{PIPEFAIL} {line}")
        } else {
            line
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A local process invocation: program plus argument vector, no shell in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
