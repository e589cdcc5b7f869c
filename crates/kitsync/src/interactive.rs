//! Interactive conflict prompting

use anyhow::Context;
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use kitsync_core::comparison::sanitize_for_terminal;
use kitsync_core::sync::{Action, ConflictPrompter, MAX_PROMPT_ATTEMPTS, PromptChoice};

const CHOICES: [(&str, PromptChoice); 3] = [
    ("Keep local file", PromptChoice::Keep),
    ("Overwrite with source", PromptChoice::Overwrite),
    ("Show diff", PromptChoice::ShowDiff),
];

/// Prompts on the terminal; all output goes to stderr so `--json` stays clean
pub struct DialoguerPrompter {
    theme: ColorfulTheme,
}

impl DialoguerPrompter {
    /// Create a new prompter
    #[must_use]
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    /// Describe the conflict in user-friendly terms
    fn describe_action(action: &Action) -> String {
        let mut text = format!(
            "⚠️  Conflict ({}):\n  Target: {}\n  Kind:   {}",
            action.reason,
            sanitize_for_terminal(&action.target_path.display().to_string()),
            action.item.kind
        );
        if action.is_removal() {
            text.push_str("\n  Overwriting will delete the local file.");
        }
        text
    }

    fn choice_at(index: usize) -> Option<PromptChoice> {
        CHOICES.get(index).map(|(_, choice)| *choice)
    }
}

impl Default for DialoguerPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictPrompter for DialoguerPrompter {
    fn announce(&mut self, action: &Action) {
        eprintln!("\n{}", Self::describe_action(action));
    }

    fn choose(&mut self, action: &Action, attempt: usize) -> anyhow::Result<Option<PromptChoice>> {
        let labels: Vec<&str> = CHOICES.iter().map(|(label, _)| *label).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt(format!(
                "{} [{}/{MAX_PROMPT_ATTEMPTS}]",
                sanitize_for_terminal(&action.item.display_name()),
                attempt + 1
            ))
            .items(&labels)
            .default(0)
            .interact_opt()
            .context("Failed to show prompt")?;

        // Esc or q cancels the prompt
        Ok(selection.and_then(Self::choice_at))
    }

    fn show_diff(&mut self, rendered: &str) {
        eprintln!("\n{rendered}");
    }
}
