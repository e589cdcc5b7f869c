//! Common types and utilities for command execution

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Context;
use kitsync_core::EngineContext;
use kitsync_core::config::{Config, ConfigManager, ConfigValidator};
use kitsync_core::scanner::Scanner;

use crate::cli::{Cli, ColorArg, SyncArgs};

/// Global flags shared by every command
#[allow(clippy::struct_excessive_bools)]
pub struct GlobalOptions<'a> {
    /// Preview changes without applying (dry-run)
    pub dry_run: bool,
    /// Never prompt
    pub yes: bool,
    /// Emit JSON
    pub json: bool,
    /// Path to custom config file
    pub config_path: Option<&'a Path>,
    /// Skip loading all config files
    pub no_config: bool,
    /// Color override
    pub color: Option<ColorArg>,
}

impl<'a> GlobalOptions<'a> {
    /// Collect global flags from parsed arguments
    #[must_use]
    pub fn from_cli(cli: &'a Cli) -> Self {
        Self {
            dry_run: cli.dry_run,
            yes: cli.yes,
            json: cli.json,
            config_path: cli.config.as_deref(),
            no_config: cli.no_config,
            color: cli.color,
        }
    }

    /// Load config files (unless disabled) and apply flag overrides
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = if self.no_config {
            Config::default()
        } else {
            ConfigManager::load(self.config_path)?
        };

        // CLI flags take precedence over files
        if self.dry_run {
            config.dry_run = Some(true);
        }
        if self.yes {
            config.non_interactive = Some(true);
        }
        if let Some(color) = self.color {
            config.color = Some(color.into());
        }

        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Engine context for `target`, made absolute
    pub fn engine_context(&self, target: &Path) -> anyhow::Result<EngineContext> {
        let config = self.load_config()?;
        Ok(EngineContext::new(config, absolute(target)?))
    }
}

/// Absolute form of `path` without touching the filesystem
pub fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}

/// Scanner configured from `--provider` and `--scope`
#[must_use]
pub fn scanner(args: &SyncArgs) -> Scanner {
    Scanner::new()
        .with_provider(args.provider.clone())
        .with_scope(args.scope.into())
}

/// Absolute source root; it must exist
pub fn source_root(args: &SyncArgs) -> anyhow::Result<PathBuf> {
    let source = absolute(&args.source)?;
    if !source.is_dir() {
        anyhow::bail!("Source directory not found: {}", source.display());
    }
    Ok(source)
}

/// Whether stdout output should be colored
#[must_use]
pub fn color_enabled(config: &Config) -> bool {
    config
        .color_mode()
        .enabled(std::io::stdout().is_terminal())
}

/// Whether a human can answer prompts
#[must_use]
pub fn interactive(config: &Config) -> bool {
    !config.is_non_interactive() && std::io::stdin().is_terminal()
}
