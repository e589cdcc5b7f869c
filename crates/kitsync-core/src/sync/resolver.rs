//! Conflict resolution
//!
//! Each conflicting action is resolved to [`Resolution::Keep`] or
//! [`Resolution::Overwrite`] by a small bounded state machine. Without an
//! interactive terminal every conflict is kept. Interactively the user gets
//! at most [`MAX_PROMPT_ATTEMPTS`] prompts; asking for the diff consumes one,
//! and running out of attempts keeps the local file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::actions::{Action, ActionKind};
use super::plan::Plan;
use crate::comparison::DiffRenderer;
use crate::error::Result;

/// Upper bound on prompts shown for a single conflict
pub const MAX_PROMPT_ATTEMPTS: usize = 5;

/// Terminal outcome of resolving one conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Leave the local file as it is
    Keep,
    /// Replace (or remove) the local file with what the source proposes
    Overwrite,
}

/// What the user picked at one prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    /// Keep local
    Keep,
    /// Take the source version
    Overwrite,
    /// Show the diff and ask again
    ShowDiff,
}

/// Input driving the resolver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptInput {
    /// A selection was made
    Choice(PromptChoice),
    /// The prompt was dismissed or failed
    Cancelled,
}

/// Resolver state for one conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// Waiting on prompt number `attempt` (zero-based)
    Prompting {
        /// Prompts already consumed
        attempt: usize,
    },
    /// Done
    Resolved(Resolution),
}

impl ResolverState {
    /// Apply one input.
    #[must_use]
    pub fn next(self, input: PromptInput) -> Self {
        let Self::Prompting { attempt } = self else {
            return self;
        };
        match input {
            PromptInput::Cancelled | PromptInput::Choice(PromptChoice::Keep) => {
                Self::Resolved(Resolution::Keep)
            }
            PromptInput::Choice(PromptChoice::Overwrite) => Self::Resolved(Resolution::Overwrite),
            PromptInput::Choice(PromptChoice::ShowDiff) => {
                if attempt + 1 >= MAX_PROMPT_ATTEMPTS {
                    Self::Resolved(Resolution::Keep)
                } else {
                    Self::Prompting {
                        attempt: attempt + 1,
                    }
                }
            }
        }
    }
}

/// Terminal-facing side of conflict resolution
pub trait ConflictPrompter {
    /// Present the conflict (path, reason, change size) before the first prompt
    fn announce(&mut self, action: &Action);

    /// Ask for a choice. `Ok(None)` means the user cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal interaction fails.
    fn choose(&mut self, action: &Action, attempt: usize) -> Result<Option<PromptChoice>>;

    /// Display already sanitized diff text
    fn show_diff(&mut self, rendered: &str);
}

/// How conflicts should be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOptions {
    /// Whether a human can be prompted
    pub interactive: bool,
    /// Whether diffs are colored
    pub color: bool,
}

/// Resolutions keyed by target path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolutions(BTreeMap<PathBuf, Resolution>);

impl Resolutions {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolution
    pub fn insert(&mut self, target: impl Into<PathBuf>, resolution: Resolution) {
        self.0.insert(target.into(), resolution);
    }

    /// Resolution for `target`, if one was recorded
    #[must_use]
    pub fn get(&self, target: &Path) -> Option<Resolution> {
        self.0.get(target).copied()
    }

    /// Number of conflicts resolved to keep
    #[must_use]
    pub fn kept(&self) -> usize {
        self.0.values().filter(|r| **r == Resolution::Keep).count()
    }

    /// Number of conflicts resolved to overwrite
    #[must_use]
    pub fn overwritten(&self) -> usize {
        self.0.values().filter(|r| **r == Resolution::Overwrite).count()
    }

    /// Iterate over `(target, resolution)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&Path, Resolution)> {
        self.0.iter().map(|(p, r)| (p.as_path(), *r))
    }
}

/// Drives conflict resolution one item at a time
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    options: ResolveOptions,
}

impl ConflictResolver {
    /// Create a resolver
    #[must_use]
    pub const fn new(options: ResolveOptions) -> Self {
        Self { options }
    }

    /// Resolve a single conflict
    pub fn resolve(&self, action: &Action, prompter: &mut dyn ConflictPrompter) -> Resolution {
        if !self.options.interactive {
            info!(path = %action.target_path.display(), "keeping local file (non-interactive)");
            return Resolution::Keep;
        }

        prompter.announce(action);

        let renderer = DiffRenderer::new(self.options.color);
        let mut state = ResolverState::Prompting { attempt: 0 };

        loop {
            let attempt = match state {
                ResolverState::Resolved(resolution) => {
                    debug!(
                        path = %action.target_path.display(),
                        ?resolution,
                        "conflict resolved"
                    );
                    return resolution;
                }
                ResolverState::Prompting { attempt } => attempt,
            };

            let input = match prompter.choose(action, attempt) {
                Ok(Some(choice)) => PromptInput::Choice(choice),
                Ok(None) => PromptInput::Cancelled,
                Err(e) => {
                    warn!(error = %e, "prompt failed; keeping local file");
                    PromptInput::Cancelled
                }
            };

            if input == PromptInput::Choice(PromptChoice::ShowDiff) {
                match action.diff.as_deref() {
                    Some(diff) => prompter.show_diff(&renderer.render(diff)),
                    None => prompter.show_diff("(no diff available)\n"),
                }
            }

            state = state.next(input);
        }
    }

    /// Resolve every conflict in `plan`, sequentially and in plan order
    pub fn resolve_all(&self, plan: &Plan, prompter: &mut dyn ConflictPrompter) -> Resolutions {
        let mut resolutions = Resolutions::new();
        for action in plan.conflicts() {
            debug_assert_eq!(action.kind, ActionKind::Conflict);
            let resolution = self.resolve(action, prompter);
            resolutions.insert(action.target_path.clone(), resolution);
        }
        resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::comparison::{DiffGenerator, Hasher};
    use crate::item::{Candidate, Item, ItemKind};
    use crate::local::LocalState;
    use crate::sync::actions::{Decision, Reason};

    /// Prompter replaying scripted answers, counting interactions
    struct Scripted {
        answers: VecDeque<Result<Option<PromptChoice>>>,
        prompts: usize,
        announced: usize,
        diffs: Vec<String>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<Option<PromptChoice>>>) -> Self {
            Self {
                answers: answers.into(),
                prompts: 0,
                announced: 0,
                diffs: Vec::new(),
            }
        }

        fn always(choice: PromptChoice) -> Self {
            Self::new((0..100).map(|_| Ok(Some(choice))).collect())
        }
    }

    impl ConflictPrompter for Scripted {
        fn announce(&mut self, _action: &Action) {
            self.announced += 1;
        }

        fn choose(&mut self, _action: &Action, _attempt: usize) -> Result<Option<PromptChoice>> {
            self.prompts += 1;
            self.answers.pop_front().unwrap_or(Ok(None))
        }

        fn show_diff(&mut self, rendered: &str) {
            self.diffs.push(rendered.to_string());
        }
    }

    fn conflict(target: &str, diff: &str) -> Action {
        let item = Item::new(target, ItemKind::Agent, target, Candidate::Absent);
        Action::from_decision(
            item,
            Decision {
                kind: ActionKind::Conflict,
                reason: Reason::BothModified,
            },
            &LocalState::Present(Hasher::hash_bytes(b"l")),
            Some(Hasher::hash_bytes(b"b")),
            Some(Hasher::hash_bytes(b"c")),
        )
        .with_diff(diff.to_string())
    }

    fn interactive() -> ConflictResolver {
        ConflictResolver::new(ResolveOptions {
            interactive: true,
            color: false,
        })
    }

    #[test]
    fn test_non_interactive_keeps_without_prompting() {
        let mut prompter = Scripted::always(PromptChoice::Overwrite);
        let resolver = ConflictResolver::new(ResolveOptions::default());

        let resolution = resolver.resolve(&conflict("/t/a", "d"), &mut prompter);

        assert_eq!(resolution, Resolution::Keep);
        assert_eq!(prompter.prompts, 0);
        assert_eq!(prompter.announced, 0);
    }

    #[test]
    fn test_show_diff_forever_falls_back_to_keep() {
        let mut prompter = Scripted::always(PromptChoice::ShowDiff);

        let resolution = interactive().resolve(&conflict("/t/a", "d"), &mut prompter);

        assert_eq!(resolution, Resolution::Keep);
        assert_eq!(prompter.prompts, MAX_PROMPT_ATTEMPTS);
        assert_eq!(prompter.prompts, 5);
        assert_eq!(prompter.diffs.len(), 5);
    }

    #[test]
    fn test_show_diff_then_overwrite() {
        let mut prompter = Scripted::new(vec![
            Ok(Some(PromptChoice::ShowDiff)),
            Ok(Some(PromptChoice::Overwrite)),
        ]);

        let resolution = interactive().resolve(&conflict("/t/a", "d"), &mut prompter);

        assert_eq!(resolution, Resolution::Overwrite);
        assert_eq!(prompter.prompts, 2);
        assert_eq!(prompter.diffs.len(), 1);
        assert_eq!(prompter.announced, 1);
    }

    #[test]
    fn test_cancel_keeps() {
        let mut prompter = Scripted::new(vec![Ok(None)]);
        let resolution = interactive().resolve(&conflict("/t/a", "d"), &mut prompter);

        assert_eq!(resolution, Resolution::Keep);
        assert_eq!(prompter.prompts, 1);
    }

    #[test]
    fn test_prompt_error_degrades_to_keep() {
        let mut prompter = Scripted::new(vec![Err(anyhow::anyhow!("not a terminal"))]);
        let resolution = interactive().resolve(&conflict("/t/a", "d"), &mut prompter);

        assert_eq!(resolution, Resolution::Keep);
        assert_eq!(prompter.prompts, 1);
    }

    #[test]
    fn test_shown_diff_is_sanitized() {
        let diff = DiffGenerator::generate("a\n", "a\n\x1b]0;owned\x07b\x1b[2J\n", "evil.md");
        let mut prompter = Scripted::new(vec![
            Ok(Some(PromptChoice::ShowDiff)),
            Ok(Some(PromptChoice::Keep)),
        ]);

        interactive().resolve(&conflict("/t/evil", &diff), &mut prompter);

        assert_eq!(prompter.diffs.len(), 1);
        assert!(!prompter.diffs[0].contains('\x1b'));
        assert!(prompter.diffs[0].contains("+b"));
    }

    #[test]
    fn test_state_machine_transitions() {
        let start = ResolverState::Prompting { attempt: 0 };
        assert_eq!(
            start.next(PromptInput::Choice(PromptChoice::ShowDiff)),
            ResolverState::Prompting { attempt: 1 }
        );
        assert_eq!(
            ResolverState::Prompting { attempt: 4 }.next(PromptInput::Choice(PromptChoice::ShowDiff)),
            ResolverState::Resolved(Resolution::Keep)
        );
        assert_eq!(
            start.next(PromptInput::Cancelled),
            ResolverState::Resolved(Resolution::Keep)
        );
        let done = ResolverState::Resolved(Resolution::Overwrite);
        assert_eq!(done.next(PromptInput::Choice(PromptChoice::Keep)), done);
    }

    #[test]
    fn test_resolve_all_is_sequential_in_plan_order() {
        let plan = Plan::new(vec![conflict("/t/1", "d1"), conflict("/t/2", "d2")]);
        let mut prompter = Scripted::new(vec![
            Ok(Some(PromptChoice::Overwrite)),
            Ok(Some(PromptChoice::Keep)),
        ]);

        let resolutions = interactive().resolve_all(&plan, &mut prompter);

        assert_eq!(resolutions.get(Path::new("/t/1")), Some(Resolution::Overwrite));
        assert_eq!(resolutions.get(Path::new("/t/2")), Some(Resolution::Keep));
        assert_eq!(resolutions.kept(), 1);
        assert_eq!(resolutions.overwritten(), 1);
    }
}
