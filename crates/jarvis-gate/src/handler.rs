//! Confirmation handlers: the human (or scripted) side of the gate.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::confirm::ConfirmationDecision;

/// Answers a single confirmation prompt.
///
/// Implementations may block (a terminal prompt waits for the user); async callers are expected
/// to run them on a blocking thread.
pub trait ConfirmationHandler: Send + Sync {
    fn confirm(&self, description: &str, key: &str) -> ConfirmationDecision;
}

/// Approves every request once without remembering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllow;

impl ConfirmationHandler for AlwaysAllow {
    fn confirm(&self, _description: &str, _key: &str) -> ConfirmationDecision {
        ConfirmationDecision::ONCE
    }
}

/// Rejects every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysDeny;

impl ConfirmationHandler for AlwaysDeny {
    fn confirm(&self, _description: &str, _key: &str) -> ConfirmationDecision {
        ConfirmationDecision::DENY
    }
}

/// Replays queued decisions and records every prompt it receives.
///
/// Once the queue is empty every further prompt is denied.
#[derive(Debug, Default)]
pub struct ScriptedConfirmation {
    decisions: Mutex<VecDeque<ConfirmationDecision>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedConfirmation {
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = ConfirmationDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, decision: ConfirmationDecision) {
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(decision);
    }

    /// `(description, key)` pairs in the order they were asked.
    #[must_use]
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ConfirmationHandler for ScriptedConfirmation {
    fn confirm(&self, description: &str, key: &str) -> ConfirmationDecision {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((description.to_owned(), key.to_owned()));
        self.decisions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ConfirmationDecision::DENY)
    }
}
