use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote command failed ({status}): {stderr}")]
    Command { status: String, stderr: String },

    #[error("Operation cancelled after {0:?}")]
    Cancelled(Duration),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to apply mode {mode:o} to {path}: {source}")]
    Permissions {
        path: PathBuf,
        mode: u32,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
