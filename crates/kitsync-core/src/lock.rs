//! Named advisory lock between tool invocations
//!
//! A lock is a marker file created with `create_new`. Holders in the same
//! process wake waiters through a [`LockRegistry`]; holders in other
//! processes are re-examined on a bounded timeout, and a marker older than
//! the staleness limit is force-cleared.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_LOCK_STALE_SECS, DEFAULT_LOCK_TIMEOUT_SECS};
use crate::error::{Result, SyncError};

/// Upper bound on a single wait, so releases by other processes are noticed
const CROSS_PROCESS_RECHECK: Duration = Duration::from_secs(1);

/// Lock acquisition settings
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Marker age after which it is force-cleared
    pub stale_after: Duration,
    /// Total time to wait for a live holder
    pub timeout: Duration,
    /// Command recorded in the marker for diagnostics
    pub command: String,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(DEFAULT_LOCK_STALE_SECS),
            timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            command: String::from("kitsync"),
        }
    }
}

/// Metadata written into the marker file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Holder process id
    pub pid: u32,
    /// Acquisition time, seconds since the Unix epoch
    pub started_at_unix: u64,
    /// Holder command
    pub command: String,
    /// Unique per acquisition; guards against removing someone else's marker
    pub token: String,
}

impl LockInfo {
    fn new(command: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let pid = std::process::id();
        Self {
            pid,
            started_at_unix: now.as_secs(),
            command: command.to_string(),
            token: format!("{pid}-{}", now.as_nanos()),
        }
    }

    /// Read the metadata of an existing marker
    ///
    /// Returns `None` if the marker is gone or not yet fully written.
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// In-process notifiers, one per lock marker path
#[derive(Debug, Default)]
pub struct LockRegistry {
    notifiers: Mutex<HashMap<PathBuf, Arc<Notify>>>,
}

impl LockRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notifier(&self, path: &Path) -> Arc<Notify> {
        let mut notifiers = self.notifiers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(notifiers.entry(path.to_path_buf()).or_default())
    }

    /// Number of lock paths with a notifier
    #[must_use]
    pub fn len(&self) -> usize {
        self.notifiers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no notifier has been created yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every notifier, waking anyone still waiting
    pub fn clear(&self) {
        let drained: Vec<_> = self
            .notifiers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, notify)| notify)
            .collect();
        for notify in drained {
            notify.notify_waiters();
        }
    }

    /// Acquire the lock `<dir>/<name>.lock`, waiting while a live holder has it
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LockTimeout`] if a live holder keeps the lock
    /// past `options.timeout`, or [`SyncError::LockIo`] if the marker cannot
    /// be created or inspected.
    pub async fn acquire(&self, dir: &Path, name: &str, options: &LockOptions) -> Result<LockGuard> {
        let path = dir.join(format!("{name}.lock"));
        fs::create_dir_all(dir).map_err(|source| SyncError::LockIo {
            path: dir.to_path_buf(),
            source,
        })?;

        let notify = self.notifier(&path);
        let info = LockInfo::new(&options.command);
        let started = Instant::now();

        loop {
            // Register interest before checking so a release in between is not missed.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match create_marker(&path, &info) {
                Ok(()) => {
                    debug!(path = %path.display(), "lock acquired");
                    return Ok(LockGuard {
                        path,
                        token: info.token,
                        notify: Arc::clone(&notify),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(source) => return Err(SyncError::LockIo { path, source }.into()),
            }

            let Some(age) = marker_age(&path)? else {
                continue;
            };

            if age >= options.stale_after {
                let holder = LockInfo::read(&path);
                warn!(
                    path = %path.display(),
                    age_secs = age.as_secs(),
                    holder_pid = holder.as_ref().map(|h| h.pid),
                    "force-clearing stale lock"
                );
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(source) => return Err(SyncError::LockIo { path, source }.into()),
                }
                continue;
            }

            let waited = started.elapsed();
            if waited >= options.timeout {
                return Err(SyncError::LockTimeout {
                    name: name.to_string(),
                    path,
                    waited,
                }
                .into());
            }

            let wait = (options.stale_after - age)
                .min(options.timeout - waited)
                .min(CROSS_PROCESS_RECHECK);
            debug!(path = %path.display(), wait_ms = wait.as_millis(), "lock held, waiting");
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }
}

fn create_marker(path: &Path, info: &LockInfo) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let json = serde_json::to_vec(info).map_err(std::io::Error::other)?;
    file.write_all(&json)?;
    file.sync_all()
}

/// Marker age from its modification time, `None` if it vanished
fn marker_age(path: &Path) -> Result<Option<Duration>> {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta.modified().map_err(|source| SyncError::LockIo {
                path: path.to_path_buf(),
                source,
            })?;
            // A clock skewed into the future counts as fresh.
            Ok(Some(SystemTime::now().duration_since(modified).unwrap_or_default()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SyncError::LockIo {
            path: path.to_path_buf(),
            source,
        }
        .into()),
    }
}

/// Held lock; the marker is removed when dropped
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
    notify: Arc<Notify>,
}

impl LockGuard {
    /// Marker file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_ours(&self) -> bool {
        LockInfo::read(&self.path).is_some_and(|info| info.token == self.token)
    }

    /// Bump the marker's modification time so waiters keep treating it as live
    ///
    /// Returns `false` if the marker was force-cleared or now belongs to
    /// another holder.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::LockIo`] if the marker cannot be touched.
    pub fn refresh(&self) -> Result<bool> {
        if !self.is_ours() {
            return Ok(false);
        }
        let touched = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .and_then(|file| file.set_modified(SystemTime::now()));
        match touched {
            Ok(()) => {
                debug!(path = %self.path.display(), "lock refreshed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SyncError::LockIo {
                path: self.path.clone(),
                source,
            }
            .into()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // After a forced clear the marker may belong to another holder.
        if self.is_ours() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock marker");
            } else {
                info!(path = %self.path.display(), "lock released");
            }
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(stale_ms: u64, timeout_ms: u64) -> LockOptions {
        LockOptions {
            stale_after: Duration::from_millis(stale_ms),
            timeout: Duration::from_millis(timeout_ms),
            command: "test".into(),
        }
    }

    #[tokio::test]
    async fn test_acquire_writes_metadata_and_release_removes() {
        let tmp = TempDir::new().unwrap();
        let registry = LockRegistry::new();

        let guard = registry
            .acquire(tmp.path(), "sync", &LockOptions::default())
            .await
            .unwrap();
        let info = LockInfo::read(guard.path()).unwrap();
        assert_eq!(info.pid, std::process::id());
        assert_eq!(info.command, "kitsync");

        let path = guard.path().to_path_buf();
        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let tmp = TempDir::new().unwrap();
        let registry = Arc::new(LockRegistry::new());

        let first = registry
            .acquire(tmp.path(), "sync", &options(60_000, 5_000))
            .await
            .unwrap();

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(first);
        });

        let started = Instant::now();
        let second = registry
            .acquire(tmp.path(), "sync", &options(60_000, 5_000))
            .await
            .unwrap();
        releaser.await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(second.path().exists());
    }

    #[tokio::test]
    async fn test_stale_marker_is_force_cleared() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("sync.lock");
        fs::write(&marker, r#"{"pid":1,"started_at_unix":0,"command":"old","token":"x"}"#).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let registry = LockRegistry::new();
        let guard = registry
            .acquire(tmp.path(), "sync", &options(50, 5_000))
            .await
            .unwrap();

        let info = LockInfo::read(guard.path()).unwrap();
        assert_eq!(info.pid, std::process::id());
    }

    #[tokio::test]
    async fn test_live_holder_times_out() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("sync.lock"), "{}").unwrap();

        let registry = LockRegistry::new();
        let err = registry
            .acquire(tmp.path(), "sync", &options(60_000, 100))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::LockTimeout { name, .. }) if name == "sync"
        ));
        assert!(tmp.path().join("sync.lock").exists());
    }

    #[tokio::test]
    async fn test_guard_leaves_foreign_marker() {
        let tmp = TempDir::new().unwrap();
        let registry = LockRegistry::new();

        let guard = registry
            .acquire(tmp.path(), "sync", &LockOptions::default())
            .await
            .unwrap();
        // Simulate a forced clear followed by another holder taking over
        fs::write(
            guard.path(),
            r#"{"pid":2,"started_at_unix":0,"command":"other","token":"theirs"}"#,
        )
        .unwrap();
        let path = guard.path().to_path_buf();
        drop(guard);

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_refresh_keeps_marker_fresh() {
        let tmp = TempDir::new().unwrap();
        let registry = LockRegistry::new();
        let guard = registry
            .acquire(tmp.path(), "sync", &LockOptions::default())
            .await
            .unwrap();

        let an_hour_ago = SystemTime::now() - Duration::from_secs(3_600);
        OpenOptions::new()
            .write(true)
            .open(guard.path())
            .unwrap()
            .set_modified(an_hour_ago)
            .unwrap();
        assert!(marker_age(guard.path()).unwrap().unwrap() >= Duration::from_secs(3_000));

        assert!(guard.refresh().unwrap());
        assert!(marker_age(guard.path()).unwrap().unwrap() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_refresh_reports_lost_marker() {
        let tmp = TempDir::new().unwrap();
        let registry = LockRegistry::new();
        let guard = registry
            .acquire(tmp.path(), "sync", &LockOptions::default())
            .await
            .unwrap();

        fs::write(
            guard.path(),
            r#"{"pid":2,"started_at_unix":0,"command":"other","token":"theirs"}"#,
        )
        .unwrap();
        assert!(!guard.refresh().unwrap());

        fs::remove_file(guard.path()).unwrap();
        assert!(!guard.refresh().unwrap());
    }

    #[test]
    fn test_registry_clear() {
        let registry = LockRegistry::new();
        assert!(registry.is_empty());
        let _ = registry.notifier(Path::new("/tmp/a.lock"));
        let _ = registry.notifier(Path::new("/tmp/a.lock"));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }
}
