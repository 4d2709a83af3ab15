use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use jarvis_gate::{ConfirmationDecision, ConfirmationHandler};

const CHOICES: [&str; 3] = ["Execute", "Execute and remember", "Cancel"];

/// Terminal prompt shown before a sensitive action runs.
///
/// Any prompt failure (closed stdin, Ctrl-C) counts as a cancel.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliConfirmation;

impl CliConfirmation {
    fn decision_for(selection: Option<usize>) -> ConfirmationDecision {
        match selection {
            Some(0) => ConfirmationDecision::ONCE,
            Some(1) => ConfirmationDecision::REMEMBER,
            _ => ConfirmationDecision::DENY,
        }
    }
}

impl ConfirmationHandler for CliConfirmation {
    fn confirm(&self, description: &str, key: &str) -> ConfirmationDecision {
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Jarvis wants to: {description}\n  ({key})"))
            .items(&CHOICES)
            .default(2)
            .interact_opt();
        match selection {
            Ok(choice) => Self::decision_for(choice),
            Err(e) => {
                tracing::warn!("confirmation prompt failed, treating as cancel: {e}");
                ConfirmationDecision::DENY
            }
        }
    }
}
