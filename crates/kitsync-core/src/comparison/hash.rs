//! Content hashing using SHA-256

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use crate::error::Result;

/// Directory names treated as build output and never hashed.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "__pycache__",
    "dist",
    "build",
    ".venv",
];

/// A 256-bit content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for display
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).with_context(|| format!("Invalid hex digest: {s}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| anyhow::anyhow!("Digest must be 32 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Content hasher for single files and whole directory trees
#[derive(Debug, Clone)]
pub struct Hasher {
    ignored_dirs: Vec<String>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher that skips the default build-artifact directories
    #[must_use]
    pub fn new() -> Self {
        Self {
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Add extra directory names to skip during tree hashing
    #[must_use]
    pub fn with_ignored_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dir in dirs {
            let dir = dir.into();
            if !self.ignored_dirs.contains(&dir) {
                self.ignored_dirs.push(dir);
            }
        }
        self
    }

    /// Hash an in-memory buffer
    #[must_use]
    pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
        ContentHash(Sha256::digest(bytes).into())
    }

    /// Compute SHA-256 hash of a file by streaming its contents
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn hash_file(path: &Path) -> Result<ContentHash> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buffer = [0; 8192];

        loop {
            let bytes_read = reader
                .read(&mut buffer)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentHash(hasher.finalize().into()))
    }

    /// Hash a directory tree independently of enumeration order.
    ///
    /// Each regular file contributes its `/`-separated relative path and its
    /// content digest, folded in lexicographic path order.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked or any file cannot be read.
    pub fn hash_tree(&self, root: &Path) -> Result<ContentHash> {
        let mut hasher = Sha256::new();

        for (rel, abs) in self.tree_files(root)? {
            let file_hash = Self::hash_file(&abs)?;
            hasher.update(rel.as_bytes());
            hasher.update([0u8]);
            hasher.update(file_hash.as_bytes());
        }

        Ok(ContentHash(hasher.finalize().into()))
    }

    /// Hash a path, dispatching on whether it is a file or a directory
    ///
    /// # Errors
    ///
    /// Returns an error if metadata or contents cannot be read.
    pub fn hash_path(&self, path: &Path) -> Result<ContentHash> {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
        if meta.is_dir() {
            self.hash_tree(path)
        } else {
            Self::hash_file(path)
        }
    }

    /// List hashable files under `root` as sorted `(relative, absolute)` pairs.
    ///
    /// Hidden entries, symlinks and ignored directories are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if directory traversal fails.
    pub fn tree_files(&self, root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || self.is_included(entry));

        for entry in walker {
            let entry =
                entry.with_context(|| format!("Failed to walk directory: {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root).with_context(|| {
                format!("Failed to strip prefix from {}", entry.path().display())
            })?;
            files.push((normalize_relative(rel), entry.path().to_path_buf()));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// Render a `path  digest` listing of a tree, used to diff directory items
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be hashed.
    pub fn tree_manifest(&self, root: &Path) -> Result<String> {
        let mut out = String::new();
        for (rel, abs) in self.tree_files(root)? {
            let digest = Self::hash_file(&abs)?;
            out.push_str(&rel);
            out.push_str("  ");
            out.push_str(&digest.short());
            out.push('\n');
        }
        Ok(out)
    }

    fn is_included(&self, entry: &DirEntry) -> bool {
        if entry.path_is_symlink() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            return false;
        }
        !(entry.file_type().is_dir() && self.ignored_dirs.iter().any(|d| d.as_str() == name))
    }
}

fn normalize_relative(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
