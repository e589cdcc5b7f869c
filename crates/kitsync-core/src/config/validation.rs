//! Configuration validation and error reporting

use anyhow::bail;

use super::types::Config;
use crate::error::Result;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(config: &Config) -> Result<()> {
        if config.concurrency == Some(0) {
            bail!("concurrency must be at least 1");
        }

        if config.lock_stale_secs == Some(0) {
            bail!("lock_stale_secs must be at least 1");
        }

        for dir in &config.ignore_dirs {
            if dir.trim().is_empty() {
                bail!("Ignore directory name cannot be empty");
            }
            if dir.contains(['/', '\\']) {
                bail!("Ignore directory must be a plain name, not a path: {dir}");
            }
        }

        if config
            .baseline_file
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            bail!("baseline_file cannot be empty");
        }

        Ok(())
    }
}
