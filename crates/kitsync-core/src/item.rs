//! Item descriptors handed to the engine by the installer layer

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::comparison::{ContentHash, Hasher};
use crate::error::Result;

/// Kind of managed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Tool or provider configuration file
    Config,
    /// Agent definition
    Agent,
    /// Slash command
    Command,
    /// Skill directory
    Skill,
    /// Rule file
    Rule,
}

impl ItemKind {
    /// Infer the kind from a path relative to the managed root
    #[must_use]
    pub fn infer(relative: &Path) -> Self {
        let first = relative
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned());
        match first.as_deref() {
            Some("agents") => Self::Agent,
            Some("commands") => Self::Command,
            Some("skills") => Self::Skill,
            Some("rules") => Self::Rule,
            _ => Self::Config,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Agent => "agent",
            Self::Command => "command",
            Self::Skill => "skill",
            Self::Rule => "rule",
        };
        f.write_str(s)
    }
}

/// Installation scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Project-local installation
    #[default]
    Local,
    /// User-wide installation
    Global,
}

/// Where an item's candidate content comes from
#[derive(Debug, Clone)]
pub enum Candidate {
    /// The source no longer provides this item
    Absent,
    /// Content already converted in memory
    Bytes(Arc<[u8]>),
    /// A single source file
    File(PathBuf),
    /// A source directory copied as a whole
    Tree(PathBuf),
}

impl Candidate {
    /// Whether the source still provides the item
    #[must_use]
    pub const fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Whether the candidate is directory-backed
    #[must_use]
    pub const fn is_tree(&self) -> bool {
        matches!(self, Self::Tree(_))
    }

    /// Compute the candidate hash, `None` when absent
    ///
    /// # Errors
    ///
    /// Returns an error if source content cannot be read.
    pub fn hash(&self, hasher: &Hasher) -> Result<Option<ContentHash>> {
        Ok(match self {
            Self::Absent => None,
            Self::Bytes(bytes) => Some(Hasher::hash_bytes(bytes)),
            Self::File(path) => Some(Hasher::hash_file(path)?),
            Self::Tree(path) => Some(hasher.hash_tree(path)?),
        })
    }

    /// Read single-file content, `None` for absent or tree candidates
    ///
    /// # Errors
    ///
    /// Returns an error if the source file cannot be read.
    pub fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        Ok(match self {
            Self::Absent | Self::Tree(_) => None,
            Self::Bytes(bytes) => Some(bytes.to_vec()),
            Self::File(path) => Some(
                fs::read(path)
                    .with_context(|| format!("Failed to read candidate: {}", path.display()))?,
            ),
        })
    }

    /// Text used when diffing this candidate against local content
    ///
    /// # Errors
    ///
    /// Returns an error if source content cannot be read.
    pub fn diff_text(&self, hasher: &Hasher) -> Result<String> {
        match self {
            Self::Tree(path) => hasher.tree_manifest(path),
            _ => Ok(self
                .read_bytes()?
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default()),
        }
    }
}

/// One managed file-like item
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    /// Stable identifier, unique within its kind
    pub id: String,
    /// Artifact kind
    pub kind: ItemKind,
    /// Provider the item is installed for
    pub provider: String,
    /// Installation scope
    pub scope: Scope,
    /// Destination path; unique within one plan
    pub target_path: PathBuf,
    /// Source of candidate content
    #[serde(skip)]
    pub candidate: Candidate,
}

impl Item {
    /// Create an item
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: ItemKind,
        target_path: impl Into<PathBuf>,
        candidate: Candidate,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            provider: String::from("claude"),
            scope: Scope::default(),
            target_path: target_path.into(),
            candidate,
        }
    }

    /// Set the provider
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Set the scope
    #[must_use]
    pub const fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Display name used in diff headers
    #[must_use]
    pub fn display_name(&self) -> String {
        self.target_path.file_name().map_or_else(
            || self.id.clone(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}
