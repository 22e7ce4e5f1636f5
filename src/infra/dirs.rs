//! Platform-specific directory management
//!
//! Provides the config directory and the shared temporary directory used
//! for staging artifacts and sync backups.
//!
//! Environment variables can override default directories:
//! - `LOCALPACK_CONFIG_DIR` - Override config directory
//! - `LOCALPACK_TMP_DIR` - Override temporary directory

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable names for directory overrides
pub const ENV_CONFIG_DIR: &str = "LOCALPACK_CONFIG_DIR";
pub const ENV_TMP_DIR: &str = "LOCALPACK_TMP_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "localpack";

/// Subdirectory names
const STAGING_SUBDIR: &str = "staging";
const BACKUP_SUBDIR: &str = "sync-backup";

/// Directory provider for localpack
#[derive(Debug, Clone)]
pub struct LocalpackDirs {
    config_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl LocalpackDirs {
    /// Create a new `LocalpackDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: Self::resolve_config_dir(),
            tmp_dir: Self::resolve_tmp_dir(),
        }
    }

    /// Use an explicit temporary directory (global config override)
    #[must_use]
    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    /// Get the config directory path
    ///
    /// - Linux: `$XDG_CONFIG_HOME/localpack` or `~/.config/localpack`
    /// - macOS: `~/Library/Application Support/localpack`
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Shared temporary directory
    #[must_use]
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Parent of every staging directory: `<tmp>/staging`
    #[must_use]
    pub fn staging_root(&self) -> PathBuf {
        self.tmp_dir.join(STAGING_SUBDIR)
    }

    /// Staging directory for one dependency: `<tmp>/staging/<name>`
    #[must_use]
    pub fn staging_dir(&self, dependency_name: &str) -> PathBuf {
        self.staging_root().join(dependency_name)
    }

    /// Where a synced dependency's original install is kept: `<tmp>/sync-backup/<name>`
    #[must_use]
    pub fn sync_backup_dir(&self, dependency_name: &str) -> PathBuf {
        self.tmp_dir.join(BACKUP_SUBDIR).join(dependency_name)
    }

    /// Get the global config file path
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    fn resolve_config_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_CONFIG_DIR) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
            })
    }

    fn resolve_tmp_dir() -> PathBuf {
        if let Ok(path) = env::var(ENV_TMP_DIR) {
            return PathBuf::from(path);
        }

        env::temp_dir().join(APP_NAME)
    }
}

impl Default for LocalpackDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_new_creates_instance() {
        let dirs = LocalpackDirs::new();
        assert!(!dirs.config_dir().as_os_str().is_empty());
        assert!(!dirs.tmp_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_staging_dir_keeps_scoped_names() {
        let dirs = LocalpackDirs::new().with_tmp_dir("/tmp/lp");
        assert_eq!(
            dirs.staging_dir("@acme/widgets"),
            PathBuf::from("/tmp/lp/staging/@acme/widgets")
        );
    }

    #[test]
    fn test_backup_dir_is_under_tmp_dir() {
        let dirs = LocalpackDirs::new().with_tmp_dir("/tmp/lp");
        assert!(dirs.sync_backup_dir("foo").starts_with(dirs.tmp_dir()));
        assert!(!dirs.sync_backup_dir("foo").starts_with(dirs.staging_dir("foo")));
    }

    #[test]
    fn test_global_config_path_is_under_config_dir() {
        let dirs = LocalpackDirs::new();
        assert!(dirs.global_config_path().starts_with(dirs.config_dir()));
        assert!(dirs.global_config_path().ends_with("config.toml"));
    }
}
