//! Plan construction: classify every item and aggregate the results

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::actions::{Action, ActionKind, ChangeClassifier, Decision};
use crate::baseline::BaselineLookup;
use crate::comparison::{ContentHash, DiffGenerator, Hasher};
use crate::error::{Result, SyncError};
use crate::item::Item;
use crate::local::{LocalProbe, LocalState};

/// Default cap on simultaneous hashing or filesystem operations
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Count of actions per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Installs
    pub install: usize,
    /// Updates
    pub update: usize,
    /// Skips
    pub skip: usize,
    /// Conflicts
    pub conflict: usize,
    /// Deletes
    pub delete: usize,
}

impl Summary {
    /// Count for one kind
    #[must_use]
    pub const fn count(&self, kind: ActionKind) -> usize {
        match kind {
            ActionKind::Install => self.install,
            ActionKind::Update => self.update,
            ActionKind::Skip => self.skip,
            ActionKind::Conflict => self.conflict,
            ActionKind::Delete => self.delete,
        }
    }

    fn increment(&mut self, kind: ActionKind) {
        let slot = match kind {
            ActionKind::Install => &mut self.install,
            ActionKind::Update => &mut self.update,
            ActionKind::Skip => &mut self.skip,
            ActionKind::Conflict => &mut self.conflict,
            ActionKind::Delete => &mut self.delete,
        };
        *slot += 1;
    }

    /// Total number of actions
    #[must_use]
    pub const fn total(&self) -> usize {
        self.install + self.update + self.skip + self.conflict + self.delete
    }

    /// Number of actions that would modify the filesystem without asking
    #[must_use]
    pub const fn changes(&self) -> usize {
        self.install + self.update + self.delete
    }
}

/// The complete set of per-item decisions for one reconciliation pass
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    actions: Vec<Action>,
    summary: Summary,
    has_conflicts: bool,
}

impl Plan {
    /// Build a plan, deriving the summary and conflict flag from `actions`
    #[must_use]
    pub fn new(actions: Vec<Action>) -> Self {
        let mut summary = Summary::default();
        for action in &actions {
            summary.increment(action.kind);
        }
        Self {
            has_conflicts: summary.conflict > 0,
            actions,
            summary,
        }
    }

    /// Actions in input order
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Per-kind counts
    #[must_use]
    pub const fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Whether any action is a conflict
    #[must_use]
    pub const fn has_conflicts(&self) -> bool {
        self.has_conflicts
    }

    /// Actions of one kind, in plan order
    pub fn actions_of(&self, kind: ActionKind) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }

    /// Conflicting actions, in plan order
    pub fn conflicts(&self) -> impl Iterator<Item = &Action> {
        self.actions_of(ActionKind::Conflict)
    }

    /// Whether the plan has nothing to do
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.summary.changes() == 0 && !self.has_conflicts
    }
}

/// An item that could not be classified
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    /// Item identifier
    pub id: String,
    /// Target path
    pub target_path: PathBuf,
    /// Error description, including its cause chain
    pub error: String,
}

impl ItemFailure {
    pub(crate) fn new(item: &Item, error: &anyhow::Error) -> Self {
        Self {
            id: item.id.clone(),
            target_path: item.target_path.clone(),
            error: format!("{error:#}"),
        }
    }
}

/// Plan plus the items that failed to hash
#[derive(Debug, Clone, Serialize)]
pub struct PlanBuildResult {
    /// Successfully classified actions
    pub plan: Plan,
    /// Items excluded from the plan because hashing failed
    pub failures: Vec<ItemFailure>,
}

/// Classifies items concurrently into a [`Plan`]
pub struct PlanBuilder {
    probe: Arc<dyn LocalProbe>,
    hasher: Arc<Hasher>,
    concurrency: usize,
}

impl PlanBuilder {
    /// Create a builder reading local state through `probe`
    #[must_use]
    pub fn new(probe: Arc<dyn LocalProbe>, hasher: Arc<Hasher>) -> Self {
        Self {
            probe,
            hasher,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Limit simultaneous in-flight item evaluations
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Classify every item.
    ///
    /// Actions keep input order. Items whose local or candidate content
    /// cannot be hashed become [`ItemFailure`]s instead of actions.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateTarget`] if two items share a target path.
    pub async fn build(
        &self,
        items: Vec<Item>,
        baseline: &dyn BaselineLookup,
    ) -> Result<PlanBuildResult> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.target_path.as_path()) {
                return Err(SyncError::DuplicateTarget(item.target_path.clone()).into());
            }
        }

        info!(items = items.len(), concurrency = self.concurrency, "building plan");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let base = baseline.baseline(&item.target_path);
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("Concurrency limiter closed")?;
            let probe = Arc::clone(&self.probe);
            let hasher = Arc::clone(&self.hasher);

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let outcome = evaluate(&item, base, probe.as_ref(), &hasher);
                (item, outcome)
            });
            handles.push(handle);
        }

        let mut actions = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();

        for handle in handles {
            let (item, outcome) = handle.await.context("Plan worker panicked")?;
            match outcome {
                Ok(evaluated) => {
                    debug!(
                        path = %item.target_path.display(),
                        kind = %evaluated.decision.kind,
                        reason = %evaluated.decision.reason,
                        "classified"
                    );
                    actions.push(evaluated.into_action(item));
                }
                Err(e) => {
                    warn!(path = %item.target_path.display(), error = %e, "failed to classify item");
                    failures.push(ItemFailure::new(&item, &e));
                }
            }
        }

        let plan = Plan::new(actions);
        info!(
            install = plan.summary.install,
            update = plan.summary.update,
            skip = plan.summary.skip,
            conflict = plan.summary.conflict,
            delete = plan.summary.delete,
            failed = failures.len(),
            "plan built"
        );

        Ok(PlanBuildResult { plan, failures })
    }
}

struct Evaluated {
    decision: Decision,
    local: LocalState,
    baseline: Option<ContentHash>,
    candidate: Option<ContentHash>,
    diff: Option<String>,
}

impl Evaluated {
    fn into_action(self, item: Item) -> Action {
        let action =
            Action::from_decision(item, self.decision, &self.local, self.baseline, self.candidate);
        match self.diff {
            Some(diff) => action.with_diff(diff),
            None => action,
        }
    }
}

fn evaluate(
    item: &Item,
    baseline: Option<ContentHash>,
    probe: &dyn LocalProbe,
    hasher: &Hasher,
) -> Result<Evaluated> {
    let candidate = item.candidate.hash(hasher)?;
    let local = probe.probe(&item.target_path)?;

    let decision = ChangeClassifier::classify(&local, baseline.as_ref(), candidate.as_ref());
    let diff = if decision.kind == ActionKind::Conflict {
        Some(item_diff(item, hasher)?)
    } else {
        None
    };

    Ok(Evaluated {
        decision,
        local,
        baseline,
        candidate,
        diff,
    })
}

/// Diff from the local copy of `item` to what the source proposes.
///
/// Directory targets are compared through their file manifests.
///
/// # Errors
///
/// Returns an error if either side cannot be read.
pub fn item_diff(item: &Item, hasher: &Hasher) -> Result<String> {
    let path = &item.target_path;
    let local_text = if path.is_dir() {
        hasher.tree_manifest(path)?
    } else if !path.exists() {
        String::new()
    } else {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read local file: {}", path.display()))?;
        String::from_utf8_lossy(&bytes).into_owned()
    };
    let candidate_text = item.candidate.diff_text(hasher)?;

    Ok(DiffGenerator::generate(
        &local_text,
        &candidate_text,
        &item.display_name(),
    ))
}
