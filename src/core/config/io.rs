use crate::core::config::data::{path_display, Config};
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The configured service address is not an absolute http(s) URL.
    InvalidBaseUrl { url: String, reason: String },
}

impl ConfigError {
    fn display_path(path: &Path) -> String {
        path_display(path)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(
                    f,
                    "Failed to read config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    Self::display_path(path),
                    source
                )
            }
            ConfigError::InvalidBaseUrl { url, reason } => {
                write!(f, "Invalid base URL '{url}': {reason}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidBaseUrl { .. } => None,
        }
    }
}

impl Config {
    /// Load `explicit_path` if given (it must exist), otherwise the default
    /// location, where a missing file means defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Config, ConfigError> {
        match explicit_path {
            Some(path) => Self::read_from_path(path),
            None => match Self::default_path() {
                Some(path) => Self::load_from_path(&path),
                None => {
                    debug!("no config directory available; using defaults");
                    Ok(Config::default())
                }
            },
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if config_path.exists() {
            Self::read_from_path(config_path)
        } else {
            debug!(path = %path_display(config_path), "config file not found; using defaults");
            Ok(Config::default())
        }
    }

    fn read_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "manuscript-sync", "manuscript-sync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
