//! Atomic file operations executor

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::actions::{Action, ActionKind, Reason};
use super::plan::{DEFAULT_CONCURRENCY, Plan};
use super::resolver::{Resolution, Resolutions};
use crate::baseline::BaselineUpdate;
use crate::comparison::{ContentHash, Hasher};
use crate::error::Result;
use crate::item::Candidate;
use crate::local::{FsProbe, LocalProbe};

/// Execution switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Compute the would-be result without touching the filesystem
    pub dry_run: bool,
    /// Maximum simultaneous filesystem operations
    pub concurrency: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// What happened to one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// New file written
    Installed,
    /// Tool-managed file refreshed
    Updated,
    /// Tool-managed file removed
    Deleted,
    /// Nothing to do
    Skipped,
    /// Conflict resolved in favor of the local file
    Kept,
    /// Conflict resolved in favor of the source
    Overwritten,
}

/// Per-item status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    /// Applied (or would be, in a dry run)
    Applied {
        /// Outcome
        outcome: Outcome,
    },
    /// Failed; other items were unaffected
    Failed {
        /// Error description
        error: String,
    },
}

/// Result for one action
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    /// Item identifier
    pub id: String,
    /// Target path
    pub target_path: PathBuf,
    /// Planned action kind
    pub action: ActionKind,
    /// Why the action was planned
    pub reason: Reason,
    /// What happened
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Aggregate result of executing a plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Per-item results, in plan order
    pub items: Vec<ItemResult>,
    /// Files installed
    pub installed: usize,
    /// Files updated
    pub updated: usize,
    /// Files deleted
    pub deleted: usize,
    /// Items skipped
    pub skipped: usize,
    /// Conflicts kept local
    pub kept: usize,
    /// Conflicts overwritten from the source
    pub overwritten: usize,
    /// Items that failed
    pub failed: usize,
    /// Changes to hand back to the baseline store
    pub baseline_updates: Vec<BaselineUpdate>,
}

impl ExecutionResult {
    /// Operations that changed (or would change) the filesystem
    #[must_use]
    pub const fn total_operations(&self) -> usize {
        self.installed + self.updated + self.deleted + self.overwritten
    }

    /// Whether every item succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// `(target, error)` for each failed item
    pub fn errors(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.items.iter().filter_map(|item| match &item.status {
            ItemStatus::Failed { error } => Some((item.target_path.as_path(), error.as_str())),
            ItemStatus::Applied { .. } => None,
        })
    }

    fn record(&mut self, result: ItemResult, update: Option<BaselineUpdate>) {
        match &result.status {
            ItemStatus::Applied { outcome } => {
                let counter = match outcome {
                    Outcome::Installed => &mut self.installed,
                    Outcome::Updated => &mut self.updated,
                    Outcome::Deleted => &mut self.deleted,
                    Outcome::Skipped => &mut self.skipped,
                    Outcome::Kept => &mut self.kept,
                    Outcome::Overwritten => &mut self.overwritten,
                };
                *counter += 1;
                self.baseline_updates.extend(update);
            }
            ItemStatus::Failed { .. } => self.failed += 1,
        }
        self.items.push(result);
    }
}

/// Filesystem effect of one action after conflict resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Write,
    Remove,
    Nothing,
}

fn operation_for(action: &Action, resolutions: &Resolutions) -> (Operation, Outcome) {
    match action.kind {
        ActionKind::Install => (Operation::Write, Outcome::Installed),
        ActionKind::Update => (Operation::Write, Outcome::Updated),
        ActionKind::Delete => (Operation::Remove, Outcome::Deleted),
        ActionKind::Skip => (Operation::Nothing, Outcome::Skipped),
        ActionKind::Conflict => match resolutions
            .get(&action.target_path)
            .unwrap_or(Resolution::Keep)
        {
            Resolution::Keep => (Operation::Nothing, Outcome::Kept),
            Resolution::Overwrite if action.is_removal() => (Operation::Remove, Outcome::Overwritten),
            Resolution::Overwrite => (Operation::Write, Outcome::Overwritten),
        },
    }
}

/// Applies a plan to the filesystem
pub struct PlanExecutor {
    hasher: Arc<Hasher>,
    probe: Arc<dyn LocalProbe>,
    options: ExecuteOptions,
}

impl PlanExecutor {
    /// Create a new executor that re-reads targets from the filesystem
    #[must_use]
    pub fn new(hasher: Arc<Hasher>, options: ExecuteOptions) -> Self {
        let probe = Arc::new(FsProbe::new((*hasher).clone()));
        Self {
            hasher,
            probe,
            options,
        }
    }

    /// Use a different probe for the pre-write check
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn LocalProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Execute every action.
    ///
    /// Conflicts use `resolutions`; a conflict without a recorded resolution
    /// is kept. Before a target is written or removed it is probed again, and
    /// a target whose content changed since planning fails instead of being
    /// touched. A failing item is recorded and never stops the others.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures (a closed limiter, a panicked worker)
    /// are returned; per-item failures are reported in the result.
    pub async fn execute(&self, plan: &Plan, resolutions: &Resolutions) -> Result<ExecutionResult> {
        let mut result = ExecutionResult {
            dry_run: self.options.dry_run,
            ..ExecutionResult::default()
        };

        info!(
            actions = plan.actions().len(),
            dry_run = self.options.dry_run,
            "executing plan"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::with_capacity(plan.actions().len());

        for action in plan.actions() {
            let (operation, outcome) = operation_for(action, resolutions);
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("Concurrency limiter closed")?;
            let action = action.clone();
            let hasher = Arc::clone(&self.hasher);
            let probe = Arc::clone(&self.probe);
            let dry_run = self.options.dry_run;

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let applied = apply(&action, operation, dry_run, &hasher, probe.as_ref());
                (action, outcome, applied)
            }));
        }

        for handle in handles {
            let (action, outcome, applied) = handle.await.context("Executor worker panicked")?;
            let (status, update) = match applied {
                Ok(update) => {
                    debug!(path = %action.target_path.display(), ?outcome, "applied");
                    (ItemStatus::Applied { outcome }, update)
                }
                Err(e) => {
                    warn!(path = %action.target_path.display(), error = %e, "failed to apply");
                    (
                        ItemStatus::Failed {
                            error: format!("{e:#}"),
                        },
                        None,
                    )
                }
            };
            result.record(
                ItemResult {
                    id: action.item.id.clone(),
                    target_path: action.target_path.clone(),
                    action: action.kind,
                    reason: action.reason,
                    status,
                },
                update,
            );
        }

        info!(
            installed = result.installed,
            updated = result.updated,
            deleted = result.deleted,
            kept = result.kept,
            overwritten = result.overwritten,
            failed = result.failed,
            "plan executed"
        );

        Ok(result)
    }
}

fn apply(
    action: &Action,
    operation: Operation,
    dry_run: bool,
    hasher: &Hasher,
    probe: &dyn LocalProbe,
) -> Result<Option<BaselineUpdate>> {
    let target = &action.target_path;
    if !dry_run && operation != Operation::Nothing {
        ensure_unchanged(action, probe)?;
    }

    match operation {
        Operation::Nothing => Ok(None),
        Operation::Remove => {
            if !dry_run {
                remove_target(target)?;
            }
            Ok(Some(BaselineUpdate::Remove {
                target_path: target.clone(),
            }))
        }
        Operation::Write => {
            let hash = if dry_run {
                action
                    .candidate_hash
                    .with_context(|| format!("No candidate hash for {}", target.display()))?
            } else {
                write_candidate(&action.item.candidate, target, hasher)?
            };
            Ok(Some(BaselineUpdate::Record {
                target_path: target.clone(),
                hash,
            }))
        }
    }
}

/// Fail if the target no longer has the content it had when planned
fn ensure_unchanged(action: &Action, probe: &dyn LocalProbe) -> Result<()> {
    let current = probe.probe(&action.target_path)?;
    if current.hash() != action.local_hash.as_ref() {
        bail!(
            "{} changed after planning; rerun to re-plan",
            action.target_path.display()
        );
    }
    Ok(())
}

/// Write candidate content to `target`, returning the hash of what was written
fn write_candidate(candidate: &Candidate, target: &Path, hasher: &Hasher) -> Result<ContentHash> {
    match candidate {
        Candidate::Absent => bail!("No candidate content for {}", target.display()),
        Candidate::Tree(source) => replace_tree(source, target, hasher),
        Candidate::Bytes(_) | Candidate::File(_) => {
            let bytes = candidate
                .read_bytes()?
                .with_context(|| format!("No candidate content for {}", target.display()))?;
            atomic_write(target, &bytes)?;
            Ok(Hasher::hash_bytes(&bytes))
        }
    }
}

fn ensure_parent(target: &Path) -> Result<&Path> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    Ok(parent)
}

/// Write a file via a sibling temp file and rename
fn atomic_write(target: &Path, bytes: &[u8]) -> Result<()> {
    if target.is_dir() {
        bail!("Refusing to replace directory with a file: {}", target.display());
    }
    let parent = ensure_parent(target)?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write temp file for {}", target.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to flush temp file for {}", target.display()))?;
    tmp.persist(target)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move temp file into {}", target.display()))?;

    Ok(())
}

/// Replace a directory: stage a full copy beside it, then swap by rename
fn replace_tree(source: &Path, target: &Path, hasher: &Hasher) -> Result<ContentHash> {
    let parent = ensure_parent(target)?;
    let name = target
        .file_name()
        .with_context(|| format!("Target has no file name: {}", target.display()))?
        .to_string_lossy()
        .into_owned();
    let pid = std::process::id();
    let staging = parent.join(format!(".{name}.kitsync-staging-{pid}"));
    let backup = parent.join(format!(".{name}.kitsync-old-{pid}"));

    remove_target(&staging)?;
    for (rel, abs) in hasher.tree_files(source)? {
        let dest = staging.join(&rel);
        ensure_parent(&dest)?;
        fs::copy(&abs, &dest)
            .with_context(|| format!("Failed to copy {} to {}", abs.display(), dest.display()))?;
    }
    fs::create_dir_all(&staging)
        .with_context(|| format!("Failed to create directory: {}", staging.display()))?;
    let hash = hasher.hash_tree(&staging)?;

    let had_target = fs::symlink_metadata(target).is_ok();
    if had_target {
        remove_target(&backup)?;
        fs::rename(target, &backup)
            .with_context(|| format!("Failed to move aside {}", target.display()))?;
    }

    if let Err(e) = fs::rename(&staging, target) {
        if had_target {
            // Put the previous version back so the target is never left missing.
            let _ = fs::rename(&backup, target);
        }
        let _ = remove_target(&staging);
        return Err(e).with_context(|| format!("Failed to move staged tree into {}", target.display()));
    }

    if had_target {
        remove_target(&backup)?;
    }
    Ok(hash)
}

/// Remove a file or directory; a missing target is not an error
fn remove_target(target: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to inspect {}", target.display())),
    };

    if meta.is_dir() {
        fs::remove_dir_all(target)
            .with_context(|| format!("Failed to remove directory: {}", target.display()))
    } else {
        fs::remove_file(target).with_context(|| format!("Failed to remove file: {}", target.display()))
    }
}
