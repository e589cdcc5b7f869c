//! Reconciliation engine
//!
//! This module turns candidate items into a plan, resolves conflicts, and
//! applies the plan:
//! - `actions`: the closed set of action kinds and the change classifier
//! - `plan`: concurrent classification into a [`Plan`] with summary counts
//! - `resolver`: bounded, sequential conflict prompting
//! - `executor`: atomic, partially failure-tolerant plan execution
//! - `reporting`: human and JSON rendering
//! - `orchestrator`: [`SyncEngine`], tying the steps to an
//!   [`EngineContext`](crate::EngineContext)

mod actions;
mod executor;
mod orchestrator;
mod plan;
mod reporting;
mod resolver;

pub use actions::{Action, ActionKind, ChangeClassifier, Decision, Reason};
pub use executor::{
    ExecuteOptions, ExecutionResult, ItemResult, ItemStatus, Outcome, PlanExecutor,
};
pub use orchestrator::{
    ApplyOptions, ApplyReport, SYNC_LOCK_NAME, SyncEngine, TrackedItem, TrackedState,
};
pub use plan::{
    DEFAULT_CONCURRENCY, ItemFailure, Plan, PlanBuildResult, PlanBuilder, Summary, item_diff,
};
pub use reporting::{DEFAULT_SKIP_DISPLAY_LIMIT, SyncReporter};
pub use resolver::{
    ConflictPrompter, ConflictResolver, MAX_PROMPT_ATTEMPTS, PromptChoice, PromptInput,
    ResolveOptions, Resolution, Resolutions, ResolverState,
};

#[cfg(test)]
mod integration_tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::*;
    use crate::config::Config;
    use crate::context::EngineContext;
    use crate::error::{Result, SyncError};
    use crate::scanner::Scanner;

    fn setup_test_dirs() -> (TempDir, TempDir) {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        (source, dest)
    }

    fn create_test_file(dir: &Path, rel_path: &str, content: &str) {
        let path = dir.join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Answers every prompt with the same choice
    struct Always {
        choice: PromptChoice,
        prompts: usize,
    }

    impl Always {
        const fn new(choice: PromptChoice) -> Self {
            Self { choice, prompts: 0 }
        }
    }

    impl ConflictPrompter for Always {
        fn announce(&mut self, _action: &Action) {}

        fn choose(&mut self, _action: &Action, _attempt: usize) -> Result<Option<PromptChoice>> {
            self.prompts += 1;
            Ok(Some(self.choice))
        }

        fn show_diff(&mut self, _rendered: &str) {}
    }

    /// Keeps every conflict; while the prompt is open it edits another
    /// target and records whether the sync lock is held
    struct EditsWhilePrompting {
        edit: PathBuf,
        lock_marker: PathBuf,
        lock_held: bool,
    }

    impl ConflictPrompter for EditsWhilePrompting {
        fn announce(&mut self, _action: &Action) {
            self.lock_held = self.lock_marker.exists();
            fs::write(&self.edit, "user edit made while prompting").unwrap();
        }

        fn choose(&mut self, _action: &Action, _attempt: usize) -> Result<Option<PromptChoice>> {
            Ok(Some(PromptChoice::Keep))
        }

        fn show_diff(&mut self, _rendered: &str) {}
    }

    fn batch() -> ApplyOptions {
        ApplyOptions::default()
    }

    fn interactive() -> ApplyOptions {
        ApplyOptions {
            interactive: true,
            ..ApplyOptions::default()
        }
    }

    async fn apply(
        ctx: &EngineContext,
        source: &Path,
        prompter: &mut dyn ConflictPrompter,
        options: ApplyOptions,
    ) -> ApplyReport {
        SyncEngine::new(ctx)
            .apply(source, &Scanner::new(), prompter, options)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sync_create_new_files() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/test.md", "test agent");
        create_test_file(source_dir.path(), "skills/skill1/SKILL.md", "test skill");
        create_test_file(source_dir.path(), "commands/git/commit.md", "commit");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        let report = apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        assert!(report.is_success());
        assert_eq!(report.execution.installed, 3);
        assert!(dest_dir.path().join("agents/test.md").exists());
        assert!(dest_dir.path().join("skills/skill1/SKILL.md").exists());
        assert!(dest_dir.path().join("commands/git/commit.md").exists());

        let baseline = ctx.baseline().unwrap();
        assert_eq!(baseline.len(), 3);
        assert!(baseline.get(&dest_dir.path().join("skills/skill1")).is_some());
        assert!(ctx.baseline_path().exists());
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/a.md", "a");
        create_test_file(source_dir.path(), "skills/s/SKILL.md", "s");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        let plan = SyncEngine::new(&ctx)
            .plan(source_dir.path(), &Scanner::new())
            .await
            .unwrap();
        assert!(plan.plan.is_noop());
        assert_eq!(plan.plan.summary().skip, 2);
    }

    #[tokio::test]
    async fn test_tool_managed_update_and_user_owned_skip() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/managed.md", "v1");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        create_test_file(source_dir.path(), "agents/managed.md", "v2");
        create_test_file(source_dir.path(), "agents/mine.md", "source");
        create_test_file(dest_dir.path(), "agents/mine.md", "hand written");

        let report = apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        assert_eq!(report.execution.updated, 1);
        assert_eq!(report.build.plan.summary().skip, 1);
        assert_eq!(
            fs::read_to_string(dest_dir.path().join("agents/managed.md")).unwrap(),
            "v2"
        );
        assert_eq!(
            fs::read_to_string(dest_dir.path().join("agents/mine.md")).unwrap(),
            "hand written"
        );
        assert_eq!(prompter.prompts, 0);
    }

    #[tokio::test]
    async fn test_conflict_kept_in_batch_mode() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "rules/style.md", "v1");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Overwrite);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        create_test_file(source_dir.path(), "rules/style.md", "v2");
        create_test_file(dest_dir.path(), "rules/style.md", "user edit");

        let report = apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        assert!(report.build.plan.has_conflicts());
        assert_eq!(report.unresolved_conflicts(), 1);
        assert!(report.check_resolved().is_ok());
        assert_eq!(prompter.prompts, 0);
        assert_eq!(
            fs::read_to_string(dest_dir.path().join("rules/style.md")).unwrap(),
            "user edit"
        );
        let diff = report.build.plan.conflicts().next().unwrap().diff.clone().unwrap();
        assert!(diff.contains("-user edit"));
        assert!(diff.contains("+v2"));
    }

    #[tokio::test]
    async fn test_force_requires_resolution() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/a.md", "v1");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        create_test_file(source_dir.path(), "agents/a.md", "v2");
        create_test_file(dest_dir.path(), "agents/a.md", "edited");

        let forced = ApplyOptions {
            force: true,
            ..batch()
        };
        let report = apply(&ctx, source_dir.path(), &mut prompter, forced).await;

        let err = report.check_resolved().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::UnresolvedConflicts(1))
        ));
    }

    #[tokio::test]
    async fn test_force_accepts_interactive_keep() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/a.md", "v1");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        create_test_file(source_dir.path(), "agents/a.md", "v2");
        create_test_file(dest_dir.path(), "agents/a.md", "edited");

        let forced = ApplyOptions {
            force: true,
            ..interactive()
        };
        let report = apply(&ctx, source_dir.path(), &mut prompter, forced).await;

        assert_eq!(prompter.prompts, 1);
        assert_eq!(report.execution.kept, 1);
        assert!(!report.require_resolution);
        assert!(report.check_resolved().is_ok());
    }

    #[tokio::test]
    async fn test_edit_during_prompt_is_not_overwritten() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/a.md", "v1");
        create_test_file(source_dir.path(), "agents/b.md", "v1");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        // a.md becomes a conflict, b.md a plain update
        create_test_file(source_dir.path(), "agents/a.md", "v2");
        create_test_file(source_dir.path(), "agents/b.md", "v2");
        create_test_file(dest_dir.path(), "agents/a.md", "edited");

        let b = dest_dir.path().join("agents/b.md");
        let mut prompter = EditsWhilePrompting {
            edit: b.clone(),
            lock_marker: ctx.lock_dir().join(format!("{SYNC_LOCK_NAME}.lock")),
            lock_held: false,
        };
        let report = apply(&ctx, source_dir.path(), &mut prompter, interactive()).await;

        assert!(prompter.lock_held);
        assert_eq!(report.build.plan.summary().update, 1);
        assert_eq!(report.execution.updated, 0);
        assert_eq!(report.execution.failed, 1);
        assert_eq!(report.execution.kept, 1);
        assert_eq!(
            fs::read_to_string(&b).unwrap(),
            "user edit made while prompting"
        );
        assert_eq!(
            ctx.baseline().unwrap().get(&b).copied(),
            Some(crate::comparison::Hasher::hash_bytes(b"v1"))
        );
        assert!(!ctx.lock_dir().join(format!("{SYNC_LOCK_NAME}.lock")).exists());
    }

    #[tokio::test]
    async fn test_interactive_overwrite_updates_baseline() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/a.md", "v1");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Overwrite);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        create_test_file(source_dir.path(), "agents/a.md", "v2");
        create_test_file(dest_dir.path(), "agents/a.md", "edited");

        let report = apply(&ctx, source_dir.path(), &mut prompter, interactive()).await;

        assert_eq!(prompter.prompts, 1);
        assert_eq!(report.execution.overwritten, 1);
        assert!(report.check_resolved().is_ok());
        let target = dest_dir.path().join("agents/a.md");
        assert_eq!(fs::read_to_string(&target).unwrap(), "v2");
        assert_eq!(
            ctx.baseline().unwrap().get(&target).copied(),
            Some(crate::comparison::Hasher::hash_bytes(b"v2"))
        );
    }

    #[tokio::test]
    async fn test_source_removal_deletes_untouched_and_flags_edited() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/untouched.md", "u");
        create_test_file(source_dir.path(), "agents/edited.md", "e");
        create_test_file(source_dir.path(), "skills/old/SKILL.md", "s");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        fs::remove_dir_all(source_dir.path().join("agents")).unwrap();
        fs::remove_dir_all(source_dir.path().join("skills")).unwrap();
        create_test_file(dest_dir.path(), "agents/edited.md", "user changed it");

        let report = apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        assert_eq!(report.execution.deleted, 2);
        assert_eq!(report.execution.kept, 1);
        assert!(!dest_dir.path().join("agents/untouched.md").exists());
        assert!(!dest_dir.path().join("skills/old").exists());
        assert!(dest_dir.path().join("agents/edited.md").exists());

        let baseline = ctx.baseline().unwrap();
        assert_eq!(baseline.len(), 1);
        assert!(baseline.get(&dest_dir.path().join("agents/edited.md")).is_some());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_disk_and_baseline() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/a.md", "a");

        let config = Config {
            dry_run: Some(true),
            ..Config::default()
        };
        let ctx = EngineContext::new(config, dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        let report = apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        assert!(report.execution.dry_run);
        assert_eq!(report.execution.installed, 1);
        assert!(!dest_dir.path().join("agents/a.md").exists());
        assert!(!ctx.baseline_path().exists());
    }

    #[tokio::test]
    async fn test_status_reports_tracked_state() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/clean.md", "c");
        create_test_file(source_dir.path(), "agents/modified.md", "m");
        create_test_file(source_dir.path(), "agents/missing.md", "x");

        let ctx = EngineContext::new(Config::default(), dest_dir.path());
        let mut prompter = Always::new(PromptChoice::Keep);
        apply(&ctx, source_dir.path(), &mut prompter, batch()).await;

        create_test_file(dest_dir.path(), "agents/modified.md", "changed");
        fs::remove_file(dest_dir.path().join("agents/missing.md")).unwrap();

        let status = SyncEngine::new(&ctx).status().unwrap();
        let states: Vec<_> = status
            .iter()
            .map(|t| (t.target_path.file_name().unwrap().to_str().unwrap(), t.state))
            .collect();

        assert_eq!(
            states,
            vec![
                ("clean.md", TrackedState::Clean),
                ("missing.md", TrackedState::Missing),
                ("modified.md", TrackedState::Modified),
            ]
        );
    }

    #[tokio::test]
    async fn test_lock_held_blocks_apply_until_timeout() {
        let (source_dir, dest_dir) = setup_test_dirs();
        create_test_file(source_dir.path(), "agents/a.md", "a");

        let config = Config {
            lock_timeout_secs: Some(0),
            ..Config::default()
        };
        let ctx = EngineContext::new(config, dest_dir.path());
        let _held = ctx
            .locks()
            .acquire(&ctx.lock_dir(), SYNC_LOCK_NAME, &ctx.lock_options("other"))
            .await
            .unwrap();

        let mut prompter = Always::new(PromptChoice::Keep);
        let err = SyncEngine::new(&ctx)
            .apply(source_dir.path(), &Scanner::new(), &mut prompter, batch())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::LockTimeout { .. })
        ));
        assert!(!dest_dir.path().join("agents/a.md").exists());
    }
}
