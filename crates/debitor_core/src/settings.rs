//! Application settings loading.
//!
//! # Responsibility
//! - Read the JSON settings file that names the store and logging setup.
//! - Resolve the effective connection string with env override and fallback.
//!
//! # Invariants
//! - A missing or blank connection string resolves to
//!   [`DEFAULT_CONNECTION_STRING`].
//! - `DEBITOR_CONNECTION_STRING`, when set and non-blank, wins over the file.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Fallback store when nothing is configured.
pub const DEFAULT_CONNECTION_STRING: &str = "debitors.sqlite3";
/// Environment variable overriding the configured connection string.
pub const CONNECTION_STRING_ENV: &str = "DEBITOR_CONNECTION_STRING";

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read settings `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid settings `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStrings {
    #[serde(default)]
    pub debitors: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: Option<String>,
    /// Absolute directory for rolling log files. Logging stays off when unset.
    #[serde(default)]
    pub dir: Option<String>,
}

/// Root of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub connection_strings: ConnectionStrings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppSettings {
    /// Loads settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Effective connection string: env override, then file, then default.
    pub fn connection_string(&self) -> String {
        let from_env = std::env::var(CONNECTION_STRING_ENV).ok();
        resolve_connection_string(from_env.as_deref(), self.connection_strings.debitors.as_deref())
    }
}

fn resolve_connection_string(from_env: Option<&str>, from_file: Option<&str>) -> String {
    [from_env, from_file]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CONNECTION_STRING)
        .to_string()
}
