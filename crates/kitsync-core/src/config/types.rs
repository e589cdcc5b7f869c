//! Configuration types and structures

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::comparison::Hasher;
use crate::sync::{DEFAULT_CONCURRENCY, DEFAULT_SKIP_DISPLAY_LIMIT};

/// Default age after which a lock marker is considered abandoned
pub const DEFAULT_LOCK_STALE_SECS: u64 = 30;

/// Default total wait for a live lock
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 120;

/// Baseline file location relative to the target root
pub const DEFAULT_BASELINE_FILE: &str = ".kitsync/baseline.json";

/// When to color terminal output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color when stdout is a terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl ColorMode {
    /// Resolve against whether the output is a terminal
    #[must_use]
    pub const fn enabled(self, is_terminal: bool) -> bool {
        match self {
            Self::Auto => is_terminal,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Main configuration structure
///
/// Every scalar is optional so that higher-precedence sources only override
/// what they actually set. Use the accessor methods for resolved values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum simultaneous hashing or filesystem operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Seconds after which a lock marker is force-cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_stale_secs: Option<u64>,

    /// Seconds to wait for a live lock before giving up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_timeout_secs: Option<u64>,

    /// Never prompt; conflicts are kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub non_interactive: Option<bool>,

    /// Plan and report without writing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    /// Terminal coloring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorMode>,

    /// Skipped items listed in the plan view before truncating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_display_limit: Option<usize>,

    /// Extra directory names excluded from tree hashing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_dirs: Vec<String>,

    /// Baseline store location; relative paths resolve against the target root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_file: Option<PathBuf>,
}

impl Config {
    /// Overlay `other` on top of `self`: set scalars win, lists accumulate
    pub fn overlay(&mut self, other: Self) {
        self.concurrency = other.concurrency.or(self.concurrency);
        self.lock_stale_secs = other.lock_stale_secs.or(self.lock_stale_secs);
        self.lock_timeout_secs = other.lock_timeout_secs.or(self.lock_timeout_secs);
        self.non_interactive = other.non_interactive.or(self.non_interactive);
        self.dry_run = other.dry_run.or(self.dry_run);
        self.color = other.color.or(self.color);
        self.skip_display_limit = other.skip_display_limit.or(self.skip_display_limit);
        self.baseline_file = other.baseline_file.or_else(|| self.baseline_file.take());

        for dir in other.ignore_dirs {
            if !self.ignore_dirs.contains(&dir) {
                self.ignore_dirs.push(dir);
            }
        }
    }

    /// Resolved concurrency cap
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    /// Resolved lock staleness timeout
    #[must_use]
    pub fn lock_stale(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs.unwrap_or(DEFAULT_LOCK_STALE_SECS))
    }

    /// Resolved total lock wait
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs.unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS))
    }

    /// Whether prompting is disabled
    #[must_use]
    pub fn is_non_interactive(&self) -> bool {
        self.non_interactive.unwrap_or(false)
    }

    /// Whether this is a dry run
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }

    /// Resolved color mode
    #[must_use]
    pub fn color_mode(&self) -> ColorMode {
        self.color.unwrap_or_default()
    }

    /// Resolved skip display limit
    #[must_use]
    pub fn skip_display_limit(&self) -> usize {
        self.skip_display_limit.unwrap_or(DEFAULT_SKIP_DISPLAY_LIMIT)
    }

    /// Baseline store path for a target root
    #[must_use]
    pub fn baseline_path(&self, target_root: &Path) -> PathBuf {
        match &self.baseline_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => target_root.join(path),
            None => target_root.join(DEFAULT_BASELINE_FILE),
        }
    }

    /// Hasher honoring the configured extra ignore directories
    #[must_use]
    pub fn hasher(&self) -> Hasher {
        Hasher::new().with_ignored_dirs(&self.ignore_dirs)
    }
}
