//! Global configuration management
//!
//! Reads optional user settings from `config.toml` in the config directory:
//! output preferences and an override for the shared temporary directory.

use crate::infra::dirs::{LocalpackDirs, ENV_TMP_DIR};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Global configuration error types
#[derive(Error, Debug)]
pub enum GlobalConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Global configuration for localpack
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalConfig {
    /// Output preferences
    #[serde(default)]
    pub output: OutputConfig,

    /// Directory overrides
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Output preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// Enable quiet mode
    pub quiet: Option<bool>,

    /// Enable JSON output
    pub json: Option<bool>,
}

/// Directory overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    /// Where artifacts are staged and sync backups are kept
    pub tmp_dir: Option<PathBuf>,
}

impl GlobalConfig {
    /// Load global configuration from the config directory
    ///
    /// A missing file yields the default configuration; an invalid one is
    /// an error.
    pub fn load(dirs: &LocalpackDirs) -> Result<Self, GlobalConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load global configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GlobalConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Apply the directory overrides to `dirs`
    ///
    /// `LOCALPACK_TMP_DIR` takes precedence over the configured `tmp_dir`.
    #[must_use]
    pub fn apply_to(&self, dirs: LocalpackDirs) -> LocalpackDirs {
        match &self.paths.tmp_dir {
            Some(tmp) if std::env::var_os(ENV_TMP_DIR).is_none() => dirs.with_tmp_dir(tmp),
            _ => dirs,
        }
    }

    /// Quiet mode, either from the flag or the config file
    #[must_use]
    pub fn quiet(&self, flag: bool) -> bool {
        flag || self.output.quiet.unwrap_or(false)
    }

    /// JSON output, either from the flag or the config file
    #[must_use]
    pub fn json(&self, flag: bool) -> bool {
        flag || self.output.json.unwrap_or(false)
    }
}
