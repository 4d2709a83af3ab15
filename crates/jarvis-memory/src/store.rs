use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::error::MemoryError;
use crate::types::{Session, SessionSummary, StoredMessage};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Save/load boundary for conversation sessions.
pub trait SessionStore: Send + Sync {
    /// Insert or replace a session and return the stored record.
    fn save_session(
        &self,
        session_id: &str,
        messages: Vec<StoredMessage>,
        metadata: Map<String, Value>,
    ) -> BoxFuture<'_, Result<Session, MemoryError>>;

    fn load_session(&self, session_id: &str) -> BoxFuture<'_, Result<Option<Session>, MemoryError>>;

    /// Most recent sessions first.
    fn list_sessions(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>, MemoryError>>;

    /// Returns `true` when a session was removed.
    fn delete_session(&self, session_id: &str) -> BoxFuture<'_, Result<bool, MemoryError>>;

    /// Sessions with at least one message containing `query`, case-insensitively.
    fn search_sessions(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SessionSummary>, MemoryError>>;

    fn last_session_id(&self) -> BoxFuture<'_, Result<Option<String>, MemoryError>>;
}
