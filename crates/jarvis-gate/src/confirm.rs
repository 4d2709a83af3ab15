use std::fmt;
use std::sync::Arc;

use crate::handler::ConfirmationHandler;
use crate::whitelist::{Category, WhitelistStore};

/// Outcome of a confirmation: whether to run the action and whether to whitelist its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationDecision {
    pub execute: bool,
    pub remember: bool,
}

impl ConfirmationDecision {
    pub const DENY: Self = Self {
        execute: false,
        remember: false,
    };
    pub const ONCE: Self = Self {
        execute: true,
        remember: false,
    };
    pub const REMEMBER: Self = Self {
        execute: true,
        remember: true,
    };
}

#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub category: Category,
    pub description: String,
    pub key: String,
    /// Prompt even when the key is already whitelisted.
    pub force: bool,
}

impl ConfirmationRequest {
    #[must_use]
    pub fn new(category: Category, description: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            category,
            description: description.into(),
            key: key.into(),
            force: false,
        }
    }

    #[must_use]
    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Decides whether an action may proceed, consulting the whitelist and the handler.
pub struct ConfirmationGate {
    store: Arc<WhitelistStore>,
    handler: Option<Arc<dyn ConfirmationHandler>>,
}

impl fmt::Debug for ConfirmationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationGate")
            .field("store", &self.store)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl ConfirmationGate {
    #[must_use]
    pub fn new(store: Arc<WhitelistStore>) -> Self {
        Self {
            store,
            handler: None,
        }
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<WhitelistStore> {
        &self.store
    }

    /// Authorize `request`.
    ///
    /// A whitelisted, non-forced key passes silently. Anything else goes to the handler; with
    /// no handler the request is denied. An approved `remember` decision whitelists the key
    /// before returning. A failure to persist the whitelist is logged and does not change the
    /// decision.
    ///
    /// This may block on the handler.
    pub fn authorize(&self, request: &ConfirmationRequest) -> ConfirmationDecision {
        if !request.force && self.store.is_member(&request.category, &request.key) {
            tracing::info!(
                category = %request.category,
                key = %request.key,
                "auto-approved (whitelisted)"
            );
            return ConfirmationDecision::ONCE;
        }

        if request.force {
            tracing::warn!(
                category = %request.category,
                key = %request.key,
                "forced confirmation: {}",
                request.description
            );
        }

        let Some(handler) = &self.handler else {
            tracing::warn!(
                category = %request.category,
                key = %request.key,
                "no confirmation handler configured, denying"
            );
            return ConfirmationDecision::DENY;
        };

        let decision = handler.confirm(&request.description, &request.key);
        if decision.execute
            && decision.remember
            && let Err(e) = self.store.add(&request.category, &request.key)
        {
            tracing::error!(
                category = %request.category,
                key = %request.key,
                "failed to persist whitelist: {e}"
            );
        }
        decision
    }
}
