//! Conversation session persistence.

pub mod error;
pub mod in_memory_store;
pub mod json_store;
pub mod store;
pub mod types;

pub use error::MemoryError;
pub use in_memory_store::InMemorySessionStore;
pub use json_store::JsonSessionStore;
pub use store::{BoxFuture, SessionStore};
pub use types::{Session, SessionSummary, StoredMessage, new_session_id, validate_session_id};
