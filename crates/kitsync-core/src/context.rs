//! Explicit engine context shared by operations
//!
//! Everything that would otherwise be process-wide cached state lives here:
//! the resolved configuration, the hasher, lock notifiers, and the loaded
//! baseline store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::baseline::BaselineStore;
use crate::comparison::Hasher;
use crate::config::Config;
use crate::error::Result;
use crate::lock::{LockOptions, LockRegistry};

/// Configuration and caches for one target root
#[derive(Debug)]
pub struct EngineContext {
    config: Config,
    target_root: PathBuf,
    baseline_path: PathBuf,
    hasher: Arc<Hasher>,
    locks: Arc<LockRegistry>,
    baseline: Mutex<Option<Arc<BaselineStore>>>,
}

impl EngineContext {
    /// Create a context for `target_root`
    #[must_use]
    pub fn new(config: Config, target_root: impl Into<PathBuf>) -> Self {
        let target_root = target_root.into();
        let baseline_path = config.baseline_path(&target_root);
        let hasher = Arc::new(config.hasher());
        Self {
            config,
            target_root,
            baseline_path,
            hasher,
            locks: Arc::new(LockRegistry::new()),
            baseline: Mutex::new(None),
        }
    }

    /// Share an existing lock registry, so contexts in one process wake each other
    #[must_use]
    pub fn with_lock_registry(mut self, locks: Arc<LockRegistry>) -> Self {
        self.locks = locks;
        self
    }

    /// Resolved configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Root under which items are installed
    #[must_use]
    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Baseline store location
    #[must_use]
    pub fn baseline_path(&self) -> &Path {
        &self.baseline_path
    }

    /// Shared hasher
    #[must_use]
    pub fn hasher(&self) -> Arc<Hasher> {
        Arc::clone(&self.hasher)
    }

    /// Lock registry
    #[must_use]
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Directory holding lock markers (beside the baseline store)
    #[must_use]
    pub fn lock_dir(&self) -> PathBuf {
        self.baseline_path
            .parent()
            .map_or_else(|| self.target_root.clone(), Path::to_path_buf)
    }

    /// Lock settings from the configuration
    #[must_use]
    pub fn lock_options(&self, command: &str) -> LockOptions {
        LockOptions {
            stale_after: self.config.lock_stale(),
            timeout: self.config.lock_timeout(),
            command: command.to_string(),
        }
    }

    /// Baseline store, loaded from disk on first use and cached afterwards
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read or parsed.
    pub fn baseline(&self) -> Result<Arc<BaselineStore>> {
        let mut cached = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = cached.as_ref() {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(BaselineStore::load(&self.baseline_path)?);
        debug!(
            path = %self.baseline_path.display(),
            entries = store.len(),
            "baseline loaded"
        );
        *cached = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Save `store` to disk and make it the cached baseline
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written; the cache is then
    /// invalidated.
    pub fn save_baseline(&self, store: BaselineStore) -> Result<()> {
        let mut cached = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = store.save(&self.baseline_path) {
            *cached = None;
            return Err(e);
        }
        *cached = Some(Arc::new(store));
        Ok(())
    }

    /// Drop the cached baseline; the next [`EngineContext::baseline`] reloads it
    pub fn invalidate(&self) {
        *self.baseline.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Invalidate caches and clear lock notifiers
    pub fn reset(&self) {
        self.invalidate();
        self.locks.clear();
    }
}
