//! Baseline store: the content hash this tool last wrote per target path
//!
//! A path with no baseline entry was never written by the tool and is treated
//! as user-owned.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::comparison::ContentHash;
use crate::error::{Result, SyncError};

const STORE_VERSION: u32 = 1;

/// Read access to baseline hashes, keyed by target path
pub trait BaselineLookup {
    /// Hash last written by the tool to `target`, if any
    fn baseline(&self, target: &Path) -> Option<ContentHash>;
}

impl BaselineLookup for HashMap<PathBuf, ContentHash> {
    fn baseline(&self, target: &Path) -> Option<ContentHash> {
        self.get(target).copied()
    }
}

impl BaselineLookup for BTreeMap<PathBuf, ContentHash> {
    fn baseline(&self, target: &Path) -> Option<ContentHash> {
        self.get(target).copied()
    }
}

/// A change to the baseline store produced by a successful execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BaselineUpdate {
    /// Record the hash just written to `target_path`
    Record {
        /// Target path
        target_path: PathBuf,
        /// New baseline hash
        hash: ContentHash,
    },
    /// Forget `target_path` after deleting it
    Remove {
        /// Target path
        target_path: PathBuf,
    },
}

impl BaselineUpdate {
    /// Target path affected by this update
    #[must_use]
    pub fn target_path(&self) -> &Path {
        match self {
            Self::Record { target_path, .. } | Self::Remove { target_path } => target_path,
        }
    }
}

/// Persisted mapping from target path to last tool-written hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineStore {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<PathBuf, ContentHash>,
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl BaselineStore {
    /// Load a store, returning an empty one if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read baseline store: {}", path.display()));
            }
        };

        let store: Self = serde_json::from_str(&content).map_err(|e| SyncError::InvalidBaseline {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if store.version != STORE_VERSION {
            return Err(SyncError::InvalidBaseline {
                path: path.to_path_buf(),
                reason: format!("unsupported version {}", store.version),
            }
            .into());
        }

        Ok(store)
    }

    /// Write the store atomically (temp file, then rename)
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        let content = serde_json::to_string_pretty(self).context("Failed to serialize baseline")?;
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write baseline temp file")?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace baseline store: {}", path.display()))?;

        Ok(())
    }

    /// Baseline hash for `target`
    #[must_use]
    pub fn get(&self, target: &Path) -> Option<&ContentHash> {
        self.entries.get(target)
    }

    /// Record a tool-written hash
    pub fn record(&mut self, target: impl Into<PathBuf>, hash: ContentHash) {
        self.entries.insert(target.into(), hash);
    }

    /// Forget a target path
    pub fn remove(&mut self, target: &Path) -> Option<ContentHash> {
        self.entries.remove(target)
    }

    /// Apply executor updates in order
    pub fn apply(&mut self, updates: &[BaselineUpdate]) {
        for update in updates {
            match update {
                BaselineUpdate::Record { target_path, hash } => {
                    self.record(target_path.clone(), *hash);
                }
                BaselineUpdate::Remove { target_path } => {
                    self.remove(target_path);
                }
            }
        }
    }

    /// All tracked entries, sorted by path
    pub fn entries(&self) -> impl Iterator<Item = (&Path, &ContentHash)> {
        self.entries.iter().map(|(p, h)| (p.as_path(), h))
    }

    /// Tracked entries located under `root`
    pub fn entries_under<'a>(
        &'a self,
        root: &'a Path,
    ) -> impl Iterator<Item = (&'a Path, &'a ContentHash)> + 'a {
        self.entries().filter(move |(p, _)| p.starts_with(root))
    }

    /// Number of tracked entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BaselineLookup for BaselineStore {
    fn baseline(&self, target: &Path) -> Option<ContentHash> {
        self.get(target).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::Hasher;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = BaselineStore::load(&tmp.path().join("baseline.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state/baseline.json");

        let mut store = BaselineStore::default();
        store.record("/t/agents/a.md", Hasher::hash_bytes(b"a"));
        store.save(&path).unwrap();

        let loaded = BaselineStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(
            loaded.baseline(Path::new("/t/agents/a.md")),
            Some(Hasher::hash_bytes(b"a"))
        );

        // No stray temp files next to the store
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_load_corrupt_store() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("baseline.json");
        fs::write(&path, "{ not json").unwrap();

        let err = BaselineStore::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::InvalidBaseline { .. })
        ));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("baseline.json");
        fs::write(&path, r#"{"version": 9, "entries": {}}"#).unwrap();

        assert!(BaselineStore::load(&path).is_err());
    }

    #[test]
    fn test_apply_updates() {
        let mut store = BaselineStore::default();
        store.record("/t/old.md", Hasher::hash_bytes(b"old"));

        store.apply(&[
            BaselineUpdate::Record {
                target_path: PathBuf::from("/t/new.md"),
                hash: Hasher::hash_bytes(b"new"),
            },
            BaselineUpdate::Remove {
                target_path: PathBuf::from("/t/old.md"),
            },
        ]);

        assert_eq!(store.len(), 1);
        assert!(store.get(Path::new("/t/old.md")).is_none());
        assert!(store.get(Path::new("/t/new.md")).is_some());
    }

    #[test]
    fn test_entries_under_root() {
        let mut store = BaselineStore::default();
        store.record("/a/x.md", Hasher::hash_bytes(b"x"));
        store.record("/b/y.md", Hasher::hash_bytes(b"y"));

        let under: Vec<_> = store.entries_under(Path::new("/a")).collect();
        assert_eq!(under.len(), 1);
        assert_eq!(under[0].0, Path::new("/a/x.md"));
    }

    #[test]
    fn test_update_serde_shape() {
        let update = BaselineUpdate::Remove {
            target_path: PathBuf::from("/t/x.md"),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["op"], "remove");
        assert_eq!(json["target_path"], "/t/x.md");
    }
}
