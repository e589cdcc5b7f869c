//! Configuration file parsing and merging
//!
//! This module handles:
//! - Config file discovery from multiple locations
//! - TOML parsing with serde
//! - Config merging with precedence rules
//! - Validation and error reporting

mod discovery;
mod merge;
mod types;
mod validation;

pub use discovery::{ConfigDiscovery, ConfigFiles, LOCAL_CONFIG_NAME, PROJECT_CONFIG_NAME};
pub use merge::ConfigMerger;
pub use types::{
    ColorMode, Config, DEFAULT_BASELINE_FILE, DEFAULT_LOCK_STALE_SECS, DEFAULT_LOCK_TIMEOUT_SECS,
};
pub use validation::ConfigValidator;

use std::path::Path;

use anyhow::bail;

use crate::error::Result;

/// Coordinates discovery, parsing, merging, and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load and merge configuration from all sources
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly requested file is missing, or if
    /// any config file is unreadable or invalid.
    pub fn load(cli_config_path: Option<&Path>) -> Result<Config> {
        Self::load_files(&ConfigDiscovery::discover(cli_config_path))
    }

    /// Merge and validate an already discovered set of files
    ///
    /// # Errors
    ///
    /// Same as [`ConfigManager::load`].
    pub fn load_files(files: &ConfigFiles) -> Result<Config> {
        if let Some(cli) = &files.cli
            && !cli.is_file()
        {
            bail!("Config file not found: {}", cli.display());
        }

        let merged = ConfigMerger::merge(files)?;
        ConfigValidator::validate(&merged)?;

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_cli_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let files = ConfigFiles {
            cli: Some(tmp.path().join("missing.toml")),
            ..ConfigFiles::default()
        };

        let err = ConfigManager::load_files(&files).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_invalid_merged_config_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        fs::write(&global, "concurrency = 4").unwrap();
        let local = tmp.path().join("local.toml");
        fs::write(&local, "concurrency = 0").unwrap();

        let files = ConfigFiles {
            local: Some(local),
            global: Some(global),
            ..ConfigFiles::default()
        };

        assert!(ConfigManager::load_files(&files).is_err());
    }
}
