use kitsync_core::sync::{SyncEngine, SyncReporter};

use super::common::{self, GlobalOptions};
use crate::cli::SyncArgs;

pub struct Plan;

impl Plan {
    /// Print the plan; evaluation failures are listed but do not fail the command
    pub async fn execute(args: &SyncArgs, options: &GlobalOptions<'_>) -> anyhow::Result<bool> {
        let source = common::source_root(args)?;
        let ctx = options.engine_context(&args.target)?;

        let built = SyncEngine::new(&ctx)
            .plan(&source, &common::scanner(args))
            .await?;

        if options.json {
            println!("{}", SyncReporter::to_json(&built)?);
        } else {
            print!(
                "{}",
                SyncReporter::render_plan(&built, ctx.config().skip_display_limit())
            );
        }

        Ok(true)
    }
}
