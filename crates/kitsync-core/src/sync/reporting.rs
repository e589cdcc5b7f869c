//! Plan and execution reporting

use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use super::actions::{ActionKind, Reason};
use super::executor::{ExecutionResult, ItemStatus, Outcome};
use super::orchestrator::ApplyReport;
use super::plan::{ItemFailure, PlanBuildResult};
use crate::comparison::sanitize_for_terminal;
use crate::error::Result;

/// Default number of skipped items listed before truncating
pub const DEFAULT_SKIP_DISPLAY_LIMIT: usize = 10;

/// Renders plans and execution results for humans and machines
pub struct SyncReporter;

impl SyncReporter {
    /// Human-readable plan view.
    ///
    /// Counts come first, then actions grouped by kind. At most
    /// `skip_limit` skipped items are listed.
    #[must_use]
    pub fn render_plan(built: &PlanBuildResult, skip_limit: usize) -> String {
        let plan = &built.plan;
        let summary = plan.summary();
        let mut output = String::new();

        output.push_str("=== Plan ===\n");
        for kind in ActionKind::ALL {
            let _ = writeln!(output, "{:<9} {}", format!("{kind}:"), summary.count(kind));
        }

        for kind in ActionKind::ALL {
            let actions: Vec<_> = plan.actions_of(kind).collect();
            if actions.is_empty() {
                continue;
            }

            let _ = writeln!(output, "\n{} ({}):", heading(kind), actions.len());

            let shown_count = if kind == ActionKind::Skip {
                skip_limit.min(actions.len())
            } else {
                actions.len()
            };
            for action in &actions[..shown_count] {
                let _ = writeln!(
                    output,
                    "  {} {} ({})",
                    marker(kind),
                    shown(&action.target_path),
                    action.reason
                );
            }
            if shown_count < actions.len() {
                let _ = writeln!(output, "  ... and {} more", actions.len() - shown_count);
            }
        }

        Self::write_failures(&mut output, &built.failures);

        if plan.is_noop() && built.failures.is_empty() {
            output.push_str("\nEverything is up to date.\n");
        }

        output
    }

    fn write_failures(output: &mut String, failures: &[ItemFailure]) {
        if failures.is_empty() {
            return;
        }
        let _ = writeln!(output, "\nFailed to evaluate ({}):", failures.len());
        for failure in failures {
            let _ = writeln!(
                output,
                "  - {}: {}",
                shown(&failure.target_path),
                sanitize_for_terminal(&failure.error)
            );
        }
    }

    /// Execution summary with counts, errors, and a status line
    #[must_use]
    pub fn generate_summary(result: &ExecutionResult) -> String {
        let mut output = String::new();

        if result.dry_run {
            output.push_str("\n=== Sync Summary (dry run) ===\n");
        } else {
            output.push_str("\n=== Sync Summary ===\n");
        }
        let _ = writeln!(output, "Installed:   {}", result.installed);
        let _ = writeln!(output, "Updated:     {}", result.updated);
        let _ = writeln!(output, "Deleted:     {}", result.deleted);

        let skip_reasons = skip_reasons(result);
        if skip_reasons.is_empty() {
            let _ = writeln!(output, "Skipped:     {}", result.skipped);
        } else {
            let _ = write!(output, "Skipped:     {}", result.skipped);
            for (reason, count) in skip_reasons {
                let _ = write!(output, " ({reason}: {count})");
            }
            let _ = writeln!(output);
        }

        let _ = writeln!(output, "Kept:        {}", result.kept);
        let _ = writeln!(output, "Overwritten: {}", result.overwritten);

        let errors: Vec<_> = result.errors().collect();
        if !errors.is_empty() {
            let _ = writeln!(output, "\nErrors ({}):", errors.len());
            for (path, error) in errors {
                let _ = writeln!(
                    output,
                    "  - {}: {}",
                    shown(path),
                    sanitize_for_terminal(error)
                );
            }
        }

        let _ = writeln!(output, "\nTotal operations: {}", result.total_operations());

        if result.is_success() {
            output.push_str("Status: ✓ Success\n");
        } else {
            output.push_str("Status: ✗ Completed with errors\n");
        }

        output
    }

    /// Summary of a whole apply run: evaluation failures, execution summary,
    /// and a note about conflicts left in place
    #[must_use]
    pub fn generate_apply_summary(report: &ApplyReport) -> String {
        let mut output = String::new();
        Self::write_failures(&mut output, &report.build.failures);
        output.push_str(&Self::generate_summary(&report.execution));

        let unresolved = report.unresolved_conflicts();
        if unresolved > 0 {
            let _ = writeln!(
                output,
                "\n{unresolved} conflict(s) kept the local file; rerun interactively to resolve them."
            );
        }

        output
    }

    /// Pretty JSON for any report value
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
        serde_json::to_string_pretty(value).context("Failed to serialize report")
    }
}

/// Path text safe to print on a terminal
fn shown(path: &Path) -> String {
    sanitize_for_terminal(&path.display().to_string())
}

const fn heading(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Install => "Install",
        ActionKind::Update => "Update",
        ActionKind::Skip => "Skip",
        ActionKind::Conflict => "Conflict",
        ActionKind::Delete => "Delete",
    }
}

const fn marker(kind: ActionKind) -> char {
    match kind {
        ActionKind::Install => '+',
        ActionKind::Update => '~',
        ActionKind::Skip => '=',
        ActionKind::Conflict => '!',
        ActionKind::Delete => '-',
    }
}

/// Skip counts per reason, most frequent first
fn skip_reasons(result: &ExecutionResult) -> Vec<(Reason, usize)> {
    let mut counts: HashMap<Reason, usize> = HashMap::new();
    for item in &result.items {
        if item.status
            == (ItemStatus::Applied {
                outcome: Outcome::Skipped,
            })
        {
            *counts.entry(item.reason).or_default() += 1;
        }
    }
    let mut reasons: Vec<_> = counts.into_iter().collect();
    reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.describe().cmp(b.0.describe())));
    reasons
}
