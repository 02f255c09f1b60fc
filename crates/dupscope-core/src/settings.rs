//! User settings file and well-known locations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DEFAULT_WORKERS, HashMode, IndexConfig, ReportConfig};

/// Application directory name under the user's configuration directory.
pub const APP_DIR: &str = "dupscope";

/// File name of the persistent index.
pub const INDEX_FILE: &str = "index.db";

/// Directory holding the index and settings (`<config dir>/dupscope`).
pub fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Well-known location of the persistent index.
pub fn default_index_path() -> Option<PathBuf> {
    app_dir().map(|d| d.join(INDEX_FILE))
}

/// Defaults read from `settings.toml`; command-line values override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of fingerprint workers.
    pub workers: usize,
    /// Default hash mode for indexing.
    pub hash_mode: HashMode,
    /// Skip unreadable files instead of aborting.
    pub ignore_errors: bool,
    /// Default folder percentage threshold for reports.
    pub min_dir_percent: f64,
    /// Default folder byte threshold for reports.
    pub min_dir_bytes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            hash_mode: HashMode::Quick,
            ignore_errors: false,
            min_dir_percent: 0.0,
            min_dir_bytes: 0,
        }
    }
}

impl Settings {
    /// Get the settings file path.
    pub fn config_path() -> Option<PathBuf> {
        app_dir().map(|d| d.join("settings.toml"))
    }

    /// Load settings from the default location, or return defaults.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`, falling back to defaults when missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %path.display(), %err, "no settings file, using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(err) => {
                debug!(path = %path.display(), %err, "invalid settings file, using defaults");
                Self::default()
            }
        }
    }

    /// Apply these defaults to an index config.
    pub fn apply_to_index(&self, config: &mut IndexConfig) {
        config.workers = self.workers.max(1);
        config.hash_mode = self.hash_mode;
        config.ignore_errors = self.ignore_errors;
    }

    /// Apply these defaults to a report config.
    pub fn apply_to_report(&self, config: &mut ReportConfig) {
        config.ignore_errors = self.ignore_errors;
        config.min_dir_percent = self.min_dir_percent;
        config.min_dir_bytes = self.min_dir_bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_partial_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");
        std::fs::write(&path, "workers = 6\nhash_mode = \"full\"\n").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.workers, 6);
        assert_eq!(settings.hash_mode, HashMode::Full);
        assert!(!settings.ignore_errors);
        assert_eq!(settings.min_dir_bytes, 0);
    }

    #[test]
    fn test_missing_or_invalid_settings_use_defaults() {
        let temp = TempDir::new().unwrap();
        assert_eq!(Settings::load_from(&temp.path().join("nope.toml")), Settings::default());

        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "workers = \"many\"").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_apply_to_index() {
        let settings = Settings {
            workers: 0,
            hash_mode: HashMode::Full,
            ..Settings::default()
        };
        let mut config = IndexConfig::new(["/data"]);
        settings.apply_to_index(&mut config);
        assert_eq!(config.workers, 1);
        assert_eq!(config.hash_mode, HashMode::Full);
    }

    #[test]
    fn test_index_path_layout() {
        if let Some(path) = default_index_path() {
            assert!(path.ends_with("dupscope/index.db"));
        }
    }
}
