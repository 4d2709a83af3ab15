use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::error::MemoryError;
use crate::store::{BoxFuture, SessionStore};
use crate::types::{Session, SessionSummary, StoredMessage, validate_session_id};

/// Process-local store used when persistence is disabled. Recency is save order.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    by_id: HashMap<String, (u64, Session)>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn newest_first(&self) -> Vec<Session> {
        let inner = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<&(u64, Session)> = inner.by_id.values().collect();
        all.sort_by(|a, b| b.0.cmp(&a.0));
        all.into_iter().map(|(_, s)| s.clone()).collect()
    }
}

impl SessionStore for InMemorySessionStore {
    fn save_session(
        &self,
        session_id: &str,
        messages: Vec<StoredMessage>,
        metadata: Map<String, Value>,
    ) -> BoxFuture<'_, Result<Session, MemoryError>> {
        let result = validate_session_id(session_id).map(|()| {
            let session = Session::new(session_id, messages, metadata);
            let mut inner = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            inner.next_seq += 1;
            let seq = inner.next_seq;
            inner
                .by_id
                .insert(session.session_id.clone(), (seq, session.clone()));
            session
        });
        Box::pin(async move { result })
    }

    fn load_session(&self, session_id: &str) -> BoxFuture<'_, Result<Option<Session>, MemoryError>> {
        let found = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(session_id)
            .map(|(_, s)| s.clone());
        Box::pin(async move { Ok(found) })
    }

    fn list_sessions(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>, MemoryError>> {
        let list = self
            .newest_first()
            .iter()
            .take(limit)
            .map(Session::summary)
            .collect();
        Box::pin(async move { Ok(list) })
    }

    fn delete_session(&self, session_id: &str) -> BoxFuture<'_, Result<bool, MemoryError>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .remove(session_id)
            .is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn search_sessions(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SessionSummary>, MemoryError>> {
        let hits = self
            .newest_first()
            .iter()
            .filter(|s| s.mentions(query))
            .take(limit)
            .map(Session::summary)
            .collect();
        Box::pin(async move { Ok(hits) })
    }

    fn last_session_id(&self) -> BoxFuture<'_, Result<Option<String>, MemoryError>> {
        let last = self.newest_first().into_iter().next().map(|s| s.session_id);
        Box::pin(async move { Ok(last) })
    }
}
