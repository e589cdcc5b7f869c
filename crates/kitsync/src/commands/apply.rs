use kitsync_core::sync::{ApplyOptions, SyncEngine, SyncReporter};

use super::common::{self, GlobalOptions};
use crate::cli::SyncArgs;
use crate::interactive::DialoguerPrompter;

pub struct Apply;

impl Apply {
    /// Plan, resolve, execute; returns whether every item succeeded
    pub async fn execute(
        args: &SyncArgs,
        force: bool,
        options: &GlobalOptions<'_>,
    ) -> anyhow::Result<bool> {
        let source = common::source_root(args)?;
        let ctx = options.engine_context(&args.target)?;
        let config = ctx.config();

        let apply_options = ApplyOptions {
            interactive: common::interactive(config),
            color: common::color_enabled(config),
            force,
        };
        tracing::debug!(?apply_options, dry_run = config.is_dry_run(), "starting apply");

        let mut prompter = DialoguerPrompter::new();
        let report = SyncEngine::new(&ctx)
            .apply(&source, &common::scanner(args), &mut prompter, apply_options)
            .await?;

        if options.json {
            println!("{}", SyncReporter::to_json(&report)?);
        } else {
            print!("{}", SyncReporter::generate_apply_summary(&report));
        }

        report.check_resolved()?;
        Ok(report.is_success())
    }
}
