//! Sync orchestration - coordinates the scan, plan, resolve, execute workflow

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::executor::{ExecuteOptions, ExecutionResult, PlanExecutor};
use super::plan::{PlanBuildResult, PlanBuilder};
use super::resolver::{ConflictPrompter, ConflictResolver, ResolveOptions, Resolutions};
use crate::context::EngineContext;
use crate::error::{Result, SyncError};
use crate::local::{FsProbe, LocalProbe, LocalState};
use crate::lock::LockGuard;
use crate::scanner::Scanner;

/// Name of the advisory lock guarding apply runs
pub const SYNC_LOCK_NAME: &str = "sync";

/// Switches for one apply run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyOptions {
    /// Whether conflicts may be prompted for
    pub interactive: bool,
    /// Whether diffs shown during prompting are colored
    pub color: bool,
    /// Without prompting, fail the run when any conflict is kept
    pub force: bool,
}

/// Everything one apply run produced
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Plan and per-item hashing failures
    #[serde(flatten)]
    pub build: PlanBuildResult,
    /// Conflict decisions
    pub resolutions: Resolutions,
    /// Execution outcome
    pub execution: ExecutionResult,
    /// Whether kept conflicts count as a failure
    pub require_resolution: bool,
}

impl ApplyReport {
    /// Conflicts left as they were
    #[must_use]
    pub fn unresolved_conflicts(&self) -> usize {
        self.execution.kept
    }

    /// Whether no item failed during planning or execution
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.build.failures.is_empty() && self.execution.is_success()
    }

    /// Turn a run that left required conflicts unresolved into an error
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnresolvedConflicts`] when resolution was
    /// required and at least one conflict was kept.
    pub fn check_resolved(&self) -> Result<()> {
        let unresolved = self.unresolved_conflicts();
        if self.require_resolution && unresolved > 0 {
            return Err(SyncError::UnresolvedConflicts(unresolved).into());
        }
        Ok(())
    }
}

/// Whether a tracked file still matches what this tool wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedState {
    /// Local content equals the baseline
    Clean,
    /// Local content was edited
    Modified,
    /// File no longer exists
    Missing,
    /// Local content could not be read
    Unreadable,
}

/// One baseline entry and its current state
#[derive(Debug, Clone, Serialize)]
pub struct TrackedItem {
    /// Target path
    pub target_path: PathBuf,
    /// Current state
    pub state: TrackedState,
}

/// Main sync engine
pub struct SyncEngine<'a> {
    ctx: &'a EngineContext,
    probe: Arc<dyn LocalProbe>,
}

impl<'a> SyncEngine<'a> {
    /// Create an engine reading local state from the filesystem
    #[must_use]
    pub fn new(ctx: &'a EngineContext) -> Self {
        let probe = Arc::new(FsProbe::new((*ctx.hasher()).clone()));
        Self { ctx, probe }
    }

    /// Use a different local-state probe
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn LocalProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Scan `source_root` and build a plan against the context's target root
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline store is invalid or two items share
    /// a target path.
    pub async fn plan(&self, source_root: &Path, scanner: &Scanner) -> Result<PlanBuildResult> {
        let target_root = self.ctx.target_root();
        let scan = scanner.scan(source_root, target_root);
        for warning in &scan.warnings {
            tracing::warn!("{warning}");
        }

        let baseline = self.ctx.baseline()?;
        let items = scanner.with_removals(scan, &baseline, target_root);

        PlanBuilder::new(Arc::clone(&self.probe), self.ctx.hasher())
            .with_concurrency(self.ctx.config().concurrency())
            .build(items, baseline.as_ref())
            .await
    }

    /// Plan, resolve conflicts, execute, and persist baseline changes
    ///
    /// Conflicts are resolved one at a time in plan order before anything is
    /// written. Outside dry runs the sync lock is held from planning until
    /// the baseline is saved, and every target is re-checked right before it
    /// is touched.
    ///
    /// # Errors
    ///
    /// Returns an error for fatal conditions only (invalid baseline,
    /// duplicate targets, lock timeout, baseline save failure). Per-item
    /// failures are reported in the [`ApplyReport`].
    pub async fn apply(
        &self,
        source_root: &Path,
        scanner: &Scanner,
        prompter: &mut dyn ConflictPrompter,
        options: ApplyOptions,
    ) -> Result<ApplyReport> {
        let config = self.ctx.config();
        let dry_run = config.is_dry_run();

        let mut guard = if dry_run {
            None
        } else {
            Some(self.lock().await?)
        };

        // Start from what is on disk, not from a cache filled by an earlier run.
        self.ctx.invalidate();
        let build = self.plan(source_root, scanner).await?;

        let resolver = ConflictResolver::new(ResolveOptions {
            interactive: options.interactive,
            color: options.color,
        });
        let resolutions = resolver.resolve_all(&build.plan, prompter);

        // Answering prompts can outlast the staleness limit.
        let reclaimed = match &guard {
            Some(held) => !held.refresh()?,
            None => false,
        };
        if reclaimed {
            warn!(
                path = %self.ctx.lock_dir().display(),
                "sync lock was reclaimed while resolving conflicts, reacquiring"
            );
            guard = Some(self.lock().await?);
        }

        let executor = PlanExecutor::new(
            self.ctx.hasher(),
            ExecuteOptions {
                dry_run,
                concurrency: config.concurrency(),
            },
        )
        .with_probe(Arc::clone(&self.probe));
        let execution = executor.execute(&build.plan, &resolutions).await?;

        if !dry_run && !execution.baseline_updates.is_empty() {
            // Reload so entries written by a run that held the lock in between survive.
            self.ctx.invalidate();
            let mut store = (*self.ctx.baseline()?).clone();
            store.apply(&execution.baseline_updates);
            self.ctx.save_baseline(store)?;
            info!(
                path = %self.ctx.baseline_path().display(),
                updates = execution.baseline_updates.len(),
                "baseline saved"
            );
        }
        drop(guard);

        Ok(ApplyReport {
            build,
            resolutions,
            execution,
            require_resolution: options.force && !options.interactive,
        })
    }

    async fn lock(&self) -> Result<LockGuard> {
        self.ctx
            .locks()
            .acquire(
                &self.ctx.lock_dir(),
                SYNC_LOCK_NAME,
                &self.ctx.lock_options("apply"),
            )
            .await
    }

    /// Compare every tracked baseline entry under the target root with the disk
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline store is invalid.
    pub fn status(&self) -> Result<Vec<TrackedItem>> {
        let baseline = self.ctx.baseline()?;

        Ok(baseline
            .entries_under(self.ctx.target_root())
            .map(|(path, hash)| {
                let state = match self.probe.probe(path) {
                    Ok(LocalState::Missing) => TrackedState::Missing,
                    Ok(LocalState::Present(local)) if local == *hash => TrackedState::Clean,
                    Ok(LocalState::Present(_)) => TrackedState::Modified,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to read tracked file");
                        TrackedState::Unreadable
                    }
                };
                TrackedItem {
                    target_path: path.to_path_buf(),
                    state,
                }
            })
            .collect())
    }
}
