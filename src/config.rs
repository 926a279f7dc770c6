use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::probe::{DEFAULT_ARGUMENT, Probe};
use crate::version::error::ConfigError;
use crate::version::operator::Mode;

// =============================================================================
// Defaults
// =============================================================================

/// Default stderr log level
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Configuration file structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    pub mode: Mode,
    /// Explicit `program -> version` pairs, e.g. `{"bash": "5.2"}`
    pub versions: HashMap<String, String>,
    pub probes: Vec<ProbeConfig>,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl FilterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// A program whose version is found by running it
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeConfig {
    pub program: String,
    #[serde(default = "default_argument")]
    pub argument: String,
    /// Regular expression whose first match is the version string
    pub pattern: Option<String>,
    /// Store the result under `VAR_VERSION` instead of `PROGRAM_VERSION`
    pub var: Option<String>,
}

fn default_argument() -> String {
    DEFAULT_ARGUMENT.to_string()
}

impl ProbeConfig {
    pub fn probe(&self) -> Result<Probe, regex::Error> {
        match &self.pattern {
            Some(pattern) => Ok(Probe::new(&self.argument, regex::Regex::new(pattern)?)),
            None => Ok(Probe::with_argument(&self.argument)),
        }
    }
}

/// Record cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Database path, defaults to [`db_path`]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl CacheConfig {
    pub fn db_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(db_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also log to this file
    pub file: Option<PathBuf>,
    /// Write the log file as JSON lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
            json: false,
        }
    }
}

/// Returns the path to the data directory for verfilter.
/// Uses $XDG_DATA_HOME/verfilter if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/verfilter,
/// or ./verfilter if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the record database.
pub fn db_path() -> PathBuf {
    data_dir().join("records.db")
}

/// Returns the default path of the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("verfilter.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("verfilter")
}
