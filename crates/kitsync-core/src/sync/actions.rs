//! Sync action determination logic

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::comparison::ContentHash;
use crate::item::Item;
use crate::local::LocalState;

/// What the engine will do with one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Write a new file where none exists
    Install,
    /// Refresh a tool-managed file the user has not touched
    Update,
    /// Leave the target alone
    Skip,
    /// Both sides changed; needs a resolution
    Conflict,
    /// Remove a tool-managed file the source dropped
    Delete,
}

impl ActionKind {
    /// All kinds, in display order
    pub const ALL: [Self; 5] = [
        Self::Install,
        Self::Update,
        Self::Conflict,
        Self::Delete,
        Self::Skip,
    ];

    /// Whether executing this kind touches the filesystem
    #[must_use]
    pub const fn mutates(self) -> bool {
        match self {
            Self::Install | Self::Update | Self::Delete => true,
            Self::Skip | Self::Conflict => false,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Skip => "skip",
            Self::Conflict => "conflict",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Why a classification was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    /// Source removed the item and the local copy is untouched
    SourceRemoved,
    /// Source removed the item but the user edited it
    RemovedButEdited,
    /// Source removed the item and it is already gone locally
    AlreadyRemoved,
    /// Source removed an item this tool never wrote
    NotTracked,
    /// Nothing exists at the target yet
    NewItem,
    /// Local content already matches the candidate
    UpToDate,
    /// Local file was never written by this tool
    UserOwned,
    /// Local content is what this tool last wrote
    ToolManaged,
    /// Local and candidate both diverged from the baseline
    BothModified,
    /// Only the user changed the file; nothing new to propagate
    LocalEditOnly,
}

impl Reason {
    /// Human-readable explanation
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::SourceRemoved => "source removed item, local untouched",
            Self::RemovedButEdited => "source wants removal, user edited",
            Self::AlreadyRemoved => "source removed item, already absent locally",
            Self::NotTracked => "source removed item that was never installed",
            Self::NewItem => "new item",
            Self::UpToDate => "no changes needed",
            Self::UserOwned => "user-owned file, never tracked",
            Self::ToolManaged => "tool-managed, safe to refresh",
            Self::BothModified => "both tool and user modified",
            Self::LocalEditOnly => "local edits only, nothing to propagate",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Classifier output: action kind plus reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Action kind
    pub kind: ActionKind,
    /// Reason
    pub reason: Reason,
}

impl Decision {
    const fn new(kind: ActionKind, reason: Reason) -> Self {
        Self { kind, reason }
    }
}

/// Maps local, baseline and candidate hashes to a single action.
///
/// An absent baseline or candidate never equals any hash.
pub struct ChangeClassifier;

impl ChangeClassifier {
    /// Classify one item
    #[must_use]
    pub fn classify(
        local: &LocalState,
        baseline: Option<&ContentHash>,
        candidate: Option<&ContentHash>,
    ) -> Decision {
        let Some(candidate) = candidate else {
            return match (baseline, local) {
                (None, _) => Decision::new(ActionKind::Skip, Reason::NotTracked),
                (Some(_), LocalState::Missing) => {
                    Decision::new(ActionKind::Skip, Reason::AlreadyRemoved)
                }
                (Some(base), LocalState::Present(l)) if l == base => {
                    Decision::new(ActionKind::Delete, Reason::SourceRemoved)
                }
                (Some(_), LocalState::Present(_)) => {
                    Decision::new(ActionKind::Conflict, Reason::RemovedButEdited)
                }
            };
        };

        let LocalState::Present(local) = local else {
            return Decision::new(ActionKind::Install, Reason::NewItem);
        };

        if local == candidate {
            return Decision::new(ActionKind::Skip, Reason::UpToDate);
        }

        match baseline {
            None => Decision::new(ActionKind::Skip, Reason::UserOwned),
            Some(base) if local == base => Decision::new(ActionKind::Update, Reason::ToolManaged),
            Some(base) if candidate != base => {
                Decision::new(ActionKind::Conflict, Reason::BothModified)
            }
            Some(_) => Decision::new(ActionKind::Skip, Reason::LocalEditOnly),
        }
    }
}

/// One planned decision for one item
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    /// What to do
    pub kind: ActionKind,
    /// The item it applies to
    pub item: Item,
    /// Destination path (same as `item.target_path`)
    pub target_path: PathBuf,
    /// Why
    pub reason: Reason,
    /// Local hash observed while planning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_hash: Option<ContentHash>,
    /// Baseline hash observed while planning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_hash: Option<ContentHash>,
    /// Candidate hash observed while planning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_hash: Option<ContentHash>,
    /// Unified diff from local to candidate, for conflicts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl Action {
    /// Build an action from a classifier decision
    #[must_use]
    pub fn from_decision(
        item: Item,
        decision: Decision,
        local: &LocalState,
        baseline: Option<ContentHash>,
        candidate: Option<ContentHash>,
    ) -> Self {
        Self {
            kind: decision.kind,
            target_path: item.target_path.clone(),
            item,
            reason: decision.reason,
            local_hash: local.hash().copied(),
            baseline_hash: baseline,
            candidate_hash: candidate,
            diff: None,
        }
    }

    /// Attach a diff
    #[must_use]
    pub fn with_diff(mut self, diff: String) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Whether resolving this conflict in favor of the source deletes the target
    #[must_use]
    pub const fn is_removal(&self) -> bool {
        !self.item.candidate.is_present()
    }
}
