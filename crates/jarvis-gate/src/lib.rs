//! Persistent whitelist and the confirmation gate in front of sensitive actions.

pub mod confirm;
pub mod handler;
pub mod whitelist;

pub use confirm::{ConfirmationDecision, ConfirmationGate, ConfirmationRequest};
pub use handler::{AlwaysAllow, AlwaysDeny, ConfirmationHandler, ScriptedConfirmation};
pub use whitelist::{Category, WhitelistError, WhitelistStore};
