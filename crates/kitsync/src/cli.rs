use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use kitsync_core::config::ColorMode;
use kitsync_core::item::Scope;

/// Reconcile installed agents, commands, skills, rules and config files
///
/// Compares each item against what kitsync last wrote and the file on disk,
/// so user edits are never overwritten without confirmation
#[derive(Parser, Debug)]
#[command(name = "kitsync")]
#[command(long_about = None, version)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Preview changes without executing (dry-run)
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Never prompt; conflicts keep the local file
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Use specific config file
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Ignore all config files
    #[arg(long, global = true, conflicts_with = "config")]
    pub no_config: bool,

    /// When to color output
    #[arg(long, global = true, value_enum, value_name = "WHEN")]
    pub color: Option<ColorArg>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Source and target roots shared by planning commands
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Directory holding candidate items
    #[arg(long, value_name = "DIR")]
    pub source: PathBuf,

    /// Directory items are installed into
    #[arg(long, value_name = "DIR")]
    pub target: PathBuf,

    /// Provider recorded on items
    #[arg(long, default_value = "claude")]
    pub provider: String,

    /// Installation scope recorded on items
    #[arg(long, value_enum, default_value = "local")]
    pub scope: ScopeArg,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show what would happen to every item
    Plan {
        #[command(flatten)]
        sync: SyncArgs,
    },

    /// Resolve conflicts and apply the plan
    Apply {
        #[command(flatten)]
        sync: SyncArgs,

        /// Without prompting, fail if any conflict keeps the local file
        #[arg(long)]
        force: bool,
    },

    /// Print diffs for pending updates and conflicts
    Diff {
        #[command(flatten)]
        sync: SyncArgs,
    },

    /// Show whether tracked files still match what kitsync wrote
    Status {
        /// Directory items are installed into
        #[arg(long, value_name = "DIR")]
        target: PathBuf,
    },

    /// Show active configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    /// Color when stdout is a terminal
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for ColorMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// Project-local installation
    Local,
    /// User-wide installation
    Global,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Local => Self::Local,
            ScopeArg::Global => Self::Global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::parse_from([
            "kitsync", "--yes", "apply", "--source", "src", "--target", "dst", "--force",
        ]);
        assert!(cli.yes);
        match cli.command {
            Commands::Apply { sync, force } => {
                assert!(force);
                assert_eq!(sync.source, PathBuf::from("src"));
                assert_eq!(sync.provider, "claude");
                assert_eq!(sync.scope, ScopeArg::Local);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_config_flags_conflict() {
        let result = Cli::try_parse_from([
            "kitsync",
            "--config",
            "a.toml",
            "--no-config",
            "config",
        ]);
        assert!(result.is_err());
    }
}
