use anyhow::Context;
use kitsync_core::config::ConfigDiscovery;

use super::common::GlobalOptions;

pub struct Config;

impl Config {
    /// Show discovered config files and the effective settings
    pub fn execute(options: &GlobalOptions<'_>) -> anyhow::Result<bool> {
        let config = options.load_config()?;

        if options.json {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(true);
        }

        if options.no_config {
            println!("# Config files: disabled (--no-config)");
        } else {
            let files = ConfigDiscovery::discover(options.config_path);
            let sources = [
                ("cli", &files.cli),
                ("local", &files.local),
                ("project", &files.project),
                ("global", &files.global),
            ];
            for (label, path) in sources {
                match path {
                    Some(path) => println!("# {label:<8} {}", path.display()),
                    None => println!("# {label:<8} (none)"),
                }
            }
        }

        println!("concurrency = {}", config.concurrency());
        println!("lock_stale_secs = {}", config.lock_stale().as_secs());
        println!("lock_timeout_secs = {}", config.lock_timeout().as_secs());
        println!("non_interactive = {}", config.is_non_interactive());
        println!("dry_run = {}", config.is_dry_run());
        println!("skip_display_limit = {}", config.skip_display_limit());

        let overrides = toml::to_string(&config).context("Failed to render config")?;
        if !overrides.trim().is_empty() {
            println!("\n# Explicitly set\n{overrides}");
        }

        Ok(true)
    }
}
