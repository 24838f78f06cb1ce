// remotebackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::AppError;
use crate::remote::Escalation;
use crate::utils::is_safe_identifier;

/// Keyword meaning "every database on the server".
pub const ALL_DATABASES: &str = "ALL";
pub const DEFAULT_COMPRESSION: &str = "gzip";
pub const DEFAULT_FILE_MODE: u32 = 0o600;
/// File stem of the PostgreSQL cluster globals artifact; no database may use it.
pub const GLOBALS_STEM: &str = "globals";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDefaults {
    pub compression: Option<String>,
    pub dest: Option<PathBuf>,
    pub fmod: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonHostConfig {
    pub host: String,
    pub user: Option<String>,
    pub ssh_port: Option<u16>,
    pub sudo_user: Option<String>,
    pub postgres: Option<serde_json::Value>,
    pub postgres_sudo_user: Option<String>,
    pub mysql: Option<serde_json::Value>,
    pub mysql_user: Option<String>,
    pub compression: Option<String>,
    pub dest: Option<PathBuf>,
    pub fmod: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    #[serde(default)]
    pub default: JsonDefaults,
    #[serde(default)]
    pub hosts: Vec<JsonHostConfig>,
}

impl RawJsonConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        Self::from_json_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// The backup strategies a host can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Postgres,
    MySql,
}

impl EngineKind {
    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Postgres => "postgres",
            EngineKind::MySql => "mysql",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved, immutable settings for one engine on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub host: String,
    pub user: Option<String>,
    pub ssh_port: Option<u16>,
    pub escalation: Escalation,
    pub compression: String,
    pub dest_root: PathBuf,
    pub file_mode: u32,
    /// Explicit allowlist; empty means discover.
    pub databases: Vec<String>,
    pub mysql_user: Option<String>,
    pub timeout: Option<Duration>,
}

impl HostConfig {
    /// A config with the documented defaults, for `host` under `dest_root`.
    pub fn new(host: impl Into<String>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            user: None,
            ssh_port: None,
            escalation: Escalation::None,
            compression: DEFAULT_COMPRESSION.to_string(),
            dest_root: dest_root.into(),
            file_mode: DEFAULT_FILE_MODE,
            databases: Vec::new(),
            mysql_user: None,
            timeout: None,
        }
    }
}

/// Parses an octal permission mask such as `0600`, `640` or `0o640`.
pub fn parse_file_mode(value: &str) -> std::result::Result<u32, AppError> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| AppError::Config(format!("fmod {value:?} is not an octal number")))?;
    if mode > 0o7777 {
        return Err(AppError::Config(format!("fmod {value:?} is out of range")));
    }
    Ok(mode)
}

/// Parses the `postgres` setting of a host.
///
/// `"ALL"` and `""` mean discovery (empty list). A comma-separated string or a JSON
/// array is an explicit allowlist, kept in order with duplicates dropped.
pub fn parse_database_list(value: &serde_json::Value) -> std::result::Result<Vec<String>, AppError> {
    let items: Vec<String> = match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s == ALL_DATABASES || s.is_empty() {
                return Ok(Vec::new());
            }
            s.split(',').map(|item| item.trim().to_string()).collect()
        }
        serde_json::Value::Array(values) => values
            .iter()
            .map(|v| {
                v.as_str().map(|s| s.trim().to_string()).ok_or_else(|| {
                    AppError::Config(format!("database list entries must be strings, got {v}"))
                })
            })
            .collect::<std::result::Result<_, _>>()?,
        other => {
            return Err(AppError::Config(format!(
                "postgres must be \"{ALL_DATABASES}\", a comma-separated string or an array of names, got {other}"
            )));
        }
    };

    let mut databases: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !is_safe_identifier(&item) {
            return Err(AppError::Config(format!("invalid database name {item:?} in postgres list")));
        }
        if item == GLOBALS_STEM {
            return Err(AppError::Config(format!(
                "database name {item:?} is reserved for the cluster globals artifact"
            )));
        }
        if !databases.contains(&item) {
            databases.push(item);
        }
    }
    Ok(databases)
}

/// `mysql` is a presence flag; only an explicit `false` turns it off.
pub fn mysql_requested(value: Option<&serde_json::Value>) -> bool {
    !matches!(value, None | Some(serde_json::Value::Bool(false)) | Some(serde_json::Value::Null))
}
