//! Runtime configuration loaded from a JSON file.
//!
//! Unknown keys are rejected so a typo never silently falls back to a default.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const KNOWN_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "warning", "error"];

/// Settings shared by the library entry points and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite file; `:memory:` selects a private in-memory store.
    pub database_path: PathBuf,
    pub log_level: String,
    /// Rolling log directory. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
    /// Base URL of the search-index service. Indexing is disabled when unset.
    pub search_index_url: Option<String>,
    pub pretty_json: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("uidsm.sqlite3"),
            log_level: crate::logging::default_log_level().to_string(),
            log_dir: None,
            search_index_url: None,
            pretty_json: false,
        }
    }
}

/// Configuration loading and validation failures.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config JSON: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid config `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON document. Missing keys take defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks field values without touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(invalid("database_path", "must not be empty"));
        }

        let level = self.log_level.trim().to_ascii_lowercase();
        if !KNOWN_LEVELS.contains(&level.as_str()) {
            return Err(invalid(
                "log_level",
                format!("unsupported level `{}`", self.log_level),
            ));
        }

        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(invalid(
                    "log_dir",
                    format!("must be absolute, got `{}`", dir.display()),
                ));
            }
        }

        if let Some(url) = &self.search_index_url {
            let lower = url.trim().to_ascii_lowercase();
            if !(lower.starts_with("http://") || lower.starts_with("https://")) {
                return Err(invalid(
                    "search_index_url",
                    format!("expected an http(s) URL, got `{url}`"),
                ));
            }
        }
        Ok(())
    }

    /// True when the store should live in memory.
    pub fn uses_in_memory_database(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}
