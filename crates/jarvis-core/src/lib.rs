//! Configuration, LLM client and application wiring.

pub mod bootstrap;
pub mod config;
pub mod llm;

pub use bootstrap::{AppContext, retry_policy};
pub use config::{Config, resolve_config_path};
pub use llm::{ChatMessage, LlmClient, LlmError};
