//! Configuration merging with precedence rules
//!
//! # Merging Semantics
//!
//! - **Scalars**: a higher-precedence file overrides only the fields it sets
//! - **`ignore_dirs`**: additive, duplicates dropped

use std::fs;
use std::path::Path;

use anyhow::Context;

use super::discovery::ConfigFiles;
use super::types::Config;
use crate::error::Result;

/// Configuration merger
pub struct ConfigMerger;

impl ConfigMerger {
    /// Merge config files with precedence rules
    ///
    /// Precedence order (highest to lowest):
    /// 1. CLI config
    /// 2. .kitsync.local.toml
    /// 3. .kitsync.toml
    /// 4. Global config
    ///
    /// # Errors
    ///
    /// Returns an error if config files cannot be read or parsed.
    pub fn merge(files: &ConfigFiles) -> Result<Config> {
        let mut merged = Config::default();

        // Lowest precedence first
        for path in [&files.global, &files.project, &files.local, &files.cli]
            .into_iter()
            .flatten()
        {
            Self::merge_into(&mut merged, path)?;
        }

        Ok(merged)
    }

    /// Load and merge a single config file into the existing config
    fn merge_into(base: &mut Config, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "loaded config file");
        base.overlay(config);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_merge_empty_config() {
        let config = ConfigMerger::merge(&ConfigFiles::default()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_merge_single_config() {
        let tmp = TempDir::new().unwrap();
        let config_file = tmp.path().join("config.toml");
        fs::write(
            &config_file,
            r#"
concurrency = 4
ignore_dirs = ["vendor", "out"]
"#,
        )
        .unwrap();

        let files = ConfigFiles {
            project: Some(config_file),
            ..ConfigFiles::default()
        };
        let config = ConfigMerger::merge(&files).unwrap();

        assert_eq!(config.concurrency(), 4);
        assert_eq!(config.ignore_dirs.len(), 2);
    }

    #[test]
    fn test_merge_precedence() {
        let tmp = TempDir::new().unwrap();

        let global = tmp.path().join("global.toml");
        fs::write(
            &global,
            "dry_run = true\nconcurrency = 2\nignore_dirs = [\"vendor\"]",
        )
        .unwrap();

        let project = tmp.path().join("project.toml");
        fs::write(&project, "dry_run = false\nignore_dirs = [\"out\"]").unwrap();

        let cli = tmp.path().join("cli.toml");
        fs::write(&cli, "concurrency = 16").unwrap();

        let files = ConfigFiles {
            cli: Some(cli),
            project: Some(project),
            global: Some(global),
            ..ConfigFiles::default()
        };
        let config = ConfigMerger::merge(&files).unwrap();

        // Higher precedence can switch a lower one's flag back off
        assert!(!config.is_dry_run());
        assert_eq!(config.concurrency(), 16);
        assert_eq!(config.ignore_dirs, vec!["vendor".to_string(), "out".to_string()]);
    }

    #[test]
    fn test_merge_reports_parse_errors_with_path() {
        let tmp = TempDir::new().unwrap();
        let bad = tmp.path().join("bad.toml");
        fs::write(&bad, "concurrency = \"many\"").unwrap();

        let files = ConfigFiles {
            local: Some(bad),
            ..ConfigFiles::default()
        };
        let err = ConfigMerger::merge(&files).unwrap_err();

        assert!(err.to_string().contains("bad.toml"));
    }
}
