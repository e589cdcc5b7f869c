use kitsync_core::comparison::{DiffRenderer, sanitize_for_terminal};
use kitsync_core::sync::{ActionKind, SyncEngine, item_diff};
use serde_json::json;

use super::common::{self, GlobalOptions};
use crate::cli::SyncArgs;

pub struct Diff;

impl Diff {
    /// Print sanitized diffs for every pending update and conflict
    pub async fn execute(args: &SyncArgs, options: &GlobalOptions<'_>) -> anyhow::Result<bool> {
        let source = common::source_root(args)?;
        let ctx = options.engine_context(&args.target)?;
        let hasher = ctx.hasher();

        let built = SyncEngine::new(&ctx)
            .plan(&source, &common::scanner(args))
            .await?;

        let mut diffs = Vec::new();
        for action in built.plan.actions() {
            if !matches!(action.kind, ActionKind::Update | ActionKind::Conflict) {
                continue;
            }
            let diff = match &action.diff {
                Some(diff) => diff.clone(),
                None => item_diff(&action.item, &hasher)?,
            };
            diffs.push((action, diff));
        }

        if options.json {
            let entries: Vec<_> = diffs
                .iter()
                .map(|(action, diff)| {
                    json!({
                        "target_path": action.target_path,
                        "kind": action.kind,
                        "reason": action.reason,
                        "diff": diff,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(true);
        }

        if diffs.is_empty() {
            println!("No pending updates or conflicts.");
            return Ok(true);
        }

        let renderer = DiffRenderer::new(common::color_enabled(ctx.config()));
        for (action, diff) in &diffs {
            println!(
                "=== {} {} ({}) ===",
                action.kind,
                sanitize_for_terminal(&action.target_path.display().to_string()),
                action.reason
            );
            print!("{}", renderer.render(diff));
            println!();
        }

        Ok(true)
    }
}
