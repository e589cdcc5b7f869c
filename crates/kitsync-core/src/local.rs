//! Current on-disk state of target paths

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::comparison::{ContentHash, Hasher};
use crate::error::Result;

/// Whether a target exists locally and, if so, its content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "hash", rename_all = "lowercase")]
pub enum LocalState {
    /// Nothing at the target path
    Missing,
    /// Target exists with this content hash
    Present(ContentHash),
}

impl LocalState {
    /// Whether the target exists
    #[must_use]
    pub const fn exists(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Content hash, if present
    #[must_use]
    pub const fn hash(&self) -> Option<&ContentHash> {
        match self {
            Self::Missing => None,
            Self::Present(hash) => Some(hash),
        }
    }
}

/// Reads local state for target paths
///
/// Implementations must be shareable across blocking worker threads.
pub trait LocalProbe: Send + Sync {
    /// Probe `target`
    ///
    /// # Errors
    ///
    /// Returns an error if the target exists but cannot be read.
    fn probe(&self, target: &Path) -> Result<LocalState>;
}

/// Probes the real filesystem, hashing files directly and directories as trees
#[derive(Debug, Clone, Default)]
pub struct FsProbe {
    hasher: Hasher,
}

impl FsProbe {
    /// Create a probe using `hasher` for directory targets
    #[must_use]
    pub const fn new(hasher: Hasher) -> Self {
        Self { hasher }
    }
}

impl LocalProbe for FsProbe {
    fn probe(&self, target: &Path) -> Result<LocalState> {
        let meta = match std::fs::symlink_metadata(target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LocalState::Missing),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to inspect {}", target.display()));
            }
        };

        let hash = if meta.is_dir() {
            self.hasher.hash_tree(target)?
        } else {
            // Symlinked targets are hashed through to their content.
            Hasher::hash_file(target)?
        };
        Ok(LocalState::Present(hash))
    }
}

impl LocalProbe for HashMap<PathBuf, LocalState> {
    fn probe(&self, target: &Path) -> Result<LocalState> {
        Ok(self.get(target).copied().unwrap_or(LocalState::Missing))
    }
}
