use std::path::Path;

use kitsync_core::comparison::sanitize_for_terminal;
use kitsync_core::sync::{SyncEngine, SyncReporter, TrackedState};

use super::common::GlobalOptions;

pub struct Status;

impl Status {
    /// List tracked files and whether they still match their baseline
    pub fn execute(target: &Path, options: &GlobalOptions<'_>) -> anyhow::Result<bool> {
        let ctx = options.engine_context(target)?;
        let tracked = SyncEngine::new(&ctx).status()?;

        if options.json {
            println!("{}", SyncReporter::to_json(&tracked)?);
            return Ok(true);
        }

        if tracked.is_empty() {
            println!("No files tracked under {}", ctx.target_root().display());
            return Ok(true);
        }

        for item in &tracked {
            let label = match item.state {
                TrackedState::Clean => "clean",
                TrackedState::Modified => "modified",
                TrackedState::Missing => "missing",
                TrackedState::Unreadable => "unreadable",
            };
            println!(
                "{label:<10} {}",
                sanitize_for_terminal(&item.target_path.display().to_string())
            );
        }

        let modified = tracked
            .iter()
            .filter(|t| t.state != TrackedState::Clean)
            .count();
        println!("\n{} tracked, {modified} changed since last sync", tracked.len());

        Ok(true)
    }
}
