use anyhow::{Context, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use which::which;

use crate::errors::AppError;

static SAFE_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("identifier pattern is valid")
});

/// Finds the ssh executable in the system PATH.
pub fn find_ssh_executable() -> Result<PathBuf> {
    which("ssh").context("ssh executable not found in PATH. Please ensure an OpenSSH client is installed and in your PATH.")
}

/// Returns true when `value` can be placed in a remote shell command without quoting.
pub fn is_safe_identifier(value: &str) -> bool {
    SAFE_IDENTIFIER.is_match(value)
}

/// Rejects values that would need shell quoting on the remote side.
///
/// `kind` names the value in the error ("database", "sudo user", ...).
pub fn ensure_safe_identifier(kind: &str, value: &str) -> crate::errors::Result<()> {
    if is_safe_identifier(value) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "{kind} name {value:?} contains characters outside [A-Za-z0-9_.-]"
        )))
    }
}
