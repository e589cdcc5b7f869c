//! Candidate discovery from a source tree
//!
//! The source layout mirrors the installed layout:
//! - `agents/`: flat, `*.md` files only
//! - `rules/`: flat, `*.md` files only
//! - `commands/`: fully recursive, `**/*.md`
//! - `skills/`: one level of directories, each holding a `SKILL.md`
//! - top level: `*.json`, `*.toml` and `*.md` config files
//!
//! Hidden entries and symlinks are never picked up. A section that cannot be
//! read is reported, and baseline entries inside it are not treated as
//! removed from the source.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::baseline::BaselineStore;
use crate::error::Result;
use crate::item::{Candidate, Item, ItemKind, Scope};

/// Marker file identifying a skill directory
pub const SKILL_MARKER: &str = "SKILL.md";

const CONFIG_EXTENSIONS: [&str; 3] = ["json", "toml", "md"];

/// One part of the source layout, scanned independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Config files directly in the source root
    TopLevel,
    /// A layout directory such as `agents`
    Dir(&'static str),
}

impl Section {
    /// Whether an item at `rel` (relative to the root) belongs to this section
    #[must_use]
    pub fn contains(self, rel: &Path) -> bool {
        match self {
            Self::TopLevel => rel.components().count() == 1,
            Self::Dir(dir) => rel.starts_with(dir),
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TopLevel => f.write_str("top-level"),
            Self::Dir(dir) => f.write_str(dir),
        }
    }
}

type SectionScan = fn(&Path) -> Result<Vec<Found>>;

const SECTIONS: [(Section, SectionScan); 5] = [
    (Section::TopLevel, scan_top_level),
    (Section::Dir("agents"), scan_agents),
    (Section::Dir("rules"), scan_rules),
    (Section::Dir("commands"), scan_commands),
    (Section::Dir("skills"), scan_skill_dir),
];

/// Result of a scan with non-fatal warnings
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Discovered items, sorted by id
    pub items: Vec<Item>,
    /// Directories that could not be read
    pub warnings: Vec<String>,
    /// Sections whose items may be missing from `items`
    pub failed: Vec<Section>,
}

impl ScanResult {
    /// Whether the item at `rel` may exist in the source but was not scanned
    #[must_use]
    pub fn is_incomplete_at(&self, rel: &Path) -> bool {
        self.failed.iter().any(|section| section.contains(rel))
    }
}

/// Discovers candidate items under a source root
#[derive(Debug, Clone)]
pub struct Scanner {
    provider: String,
    scope: Scope,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    /// Scanner for the default provider and local scope
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: String::from("claude"),
            scope: Scope::Local,
        }
    }

    /// Set the provider recorded on scanned items
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Set the scope recorded on scanned items
    #[must_use]
    pub const fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Scan `source_root`, mapping each item to the same relative path under `target_root`
    #[must_use]
    pub fn scan(&self, source_root: &Path, target_root: &Path) -> ScanResult {
        self.scan_sections(source_root, target_root, &SECTIONS)
    }

    fn scan_sections(
        &self,
        source_root: &Path,
        target_root: &Path,
        sections: &[(Section, SectionScan)],
    ) -> ScanResult {
        let mut result = ScanResult::default();
        let mut found = Vec::new();

        for &(section, scan) in sections {
            match scan(source_root) {
                Ok(entries) => found.extend(entries),
                Err(e) => {
                    tracing::warn!(%section, error = %e, "failed to scan source directory");
                    result
                        .warnings
                        .push(format!("Failed to scan {section} directory: {e:#}"));
                    result.failed.push(section);
                }
            }
        }

        for entry in found {
            let Ok(rel) = entry.path.strip_prefix(source_root) else {
                continue;
            };
            let id = slash_path(rel);
            let candidate = if entry.is_tree {
                Candidate::Tree(entry.path.clone())
            } else {
                Candidate::File(entry.path.clone())
            };
            let item = Item::new(id, ItemKind::infer(rel), target_root.join(rel), candidate)
                .with_provider(self.provider.clone())
                .with_scope(self.scope);
            result.items.push(item);
        }

        result.items.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::debug!(
            source = %source_root.display(),
            items = result.items.len(),
            "scanned source tree"
        );
        result
    }

    /// Add an absent-candidate item for every baseline entry under `target_root`
    /// that no scanned item targets
    ///
    /// Entries inside a section that failed to scan are left out, so an
    /// unreadable source directory never turns into deletes.
    #[must_use]
    pub fn with_removals(
        &self,
        scan: ScanResult,
        baseline: &BaselineStore,
        target_root: &Path,
    ) -> Vec<Item> {
        let ScanResult {
            mut items, failed, ..
        } = scan;
        let targets: HashSet<PathBuf> = items.iter().map(|i| i.target_path.clone()).collect();

        for (path, _) in baseline.entries_under(target_root) {
            if targets.contains(path) {
                continue;
            }
            let rel = path.strip_prefix(target_root).unwrap_or(path);
            if failed.iter().any(|section| section.contains(rel)) {
                tracing::debug!(path = %path.display(), "section unreadable, not planning removal");
                continue;
            }
            items.push(
                Item::new(slash_path(rel), ItemKind::infer(rel), path, Candidate::Absent)
                    .with_provider(self.provider.clone())
                    .with_scope(self.scope),
            );
        }

        items
    }
}

struct Found {
    path: PathBuf,
    is_tree: bool,
}

impl Found {
    const fn file(path: PathBuf) -> Self {
        Self {
            path,
            is_tree: false,
        }
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}

fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Regular, non-hidden files directly in `dir` accepted by `keep`
fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<Found>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // DirEntry::file_type does not follow symlinks
        if !entry.file_type()?.is_file() || is_hidden(&entry.file_name()) {
            continue;
        }
        let path = entry.path();
        if keep(&path) {
            files.push(Found::file(path));
        }
    }
    Ok(files)
}

fn scan_top_level(root: &Path) -> Result<Vec<Found>> {
    list_files(root, |path| has_extension(path, &CONFIG_EXTENSIONS))
}

fn scan_agents(root: &Path) -> Result<Vec<Found>> {
    scan_flat(&root.join("agents"))
}

fn scan_rules(root: &Path) -> Result<Vec<Found>> {
    scan_flat(&root.join("rules"))
}

fn scan_commands(root: &Path) -> Result<Vec<Found>> {
    scan_recursive(&root.join("commands"))
}

fn scan_skill_dir(root: &Path) -> Result<Vec<Found>> {
    scan_skills(&root.join("skills"))
}

fn scan_flat(dir: &Path) -> Result<Vec<Found>> {
    list_files(dir, |path| has_extension(path, &["md"]))
}

fn scan_recursive(dir: &Path) -> Result<Vec<Found>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && has_extension(entry.path(), &["md"]) {
            files.push(Found::file(entry.into_path()));
        }
    }
    Ok(files)
}

fn scan_skills(dir: &Path) -> Result<Vec<Found>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut skills = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || is_hidden(&entry.file_name()) {
            continue;
        }
        let path = entry.path();
        if path.join(SKILL_MARKER).is_file() {
            skills.push(Found {
                path,
                is_tree: true,
            });
        }
    }
    Ok(skills)
}
