use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::{Map, Value};

use crate::error::MemoryError;
use crate::store::{BoxFuture, SessionStore};
use crate::types::{Session, SessionSummary, StoredMessage, validate_session_id};

/// One pretty-printed JSON file per session inside a directory.
///
/// Recency is the file modification time, so re-saving a session moves it to the front.
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    dir: PathBuf,
}

impl JsonSessionStore {
    /// Open (and create if needed) the session directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "session store opened");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, MemoryError> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{session_id}.json")))
    }

    async fn files_newest_first(&self) -> Result<Vec<PathBuf>, MemoryError> {
        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, path));
        }
        files.sort_by(|a, b| b.cmp(a));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    async fn read_file(path: &Path) -> Result<Session, MemoryError> {
        let raw = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Sessions in recency order, skipping files that cannot be parsed.
    async fn sessions_newest_first(&self) -> Result<Vec<Session>, MemoryError> {
        let mut sessions = Vec::new();
        for path in self.files_newest_first().await? {
            match Self::read_file(&path).await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::error!(path = %path.display(), "skipping unreadable session file: {e}");
                }
            }
        }
        Ok(sessions)
    }
}

impl SessionStore for JsonSessionStore {
    fn save_session(
        &self,
        session_id: &str,
        messages: Vec<StoredMessage>,
        metadata: Map<String, Value>,
    ) -> BoxFuture<'_, Result<Session, MemoryError>> {
        let path = self.session_path(session_id);
        let session = Session::new(session_id, messages, metadata);
        Box::pin(async move {
            let path = path?;
            let json = serde_json::to_string_pretty(&session)?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, &path).await?;
            tracing::debug!(
                session_id = %session.session_id,
                messages = session.message_count,
                "session saved"
            );
            Ok(session)
        })
    }

    fn load_session(&self, session_id: &str) -> BoxFuture<'_, Result<Option<Session>, MemoryError>> {
        let path = self.session_path(session_id);
        Box::pin(async move {
            let path = path?;
            match Self::read_file(&path).await {
                Ok(session) => Ok(Some(session)),
                Err(MemoryError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    fn list_sessions(&self, limit: usize) -> BoxFuture<'_, Result<Vec<SessionSummary>, MemoryError>> {
        Box::pin(async move {
            Ok(self
                .sessions_newest_first()
                .await?
                .iter()
                .take(limit)
                .map(Session::summary)
                .collect())
        })
    }

    fn delete_session(&self, session_id: &str) -> BoxFuture<'_, Result<bool, MemoryError>> {
        let path = self.session_path(session_id);
        let session_id = session_id.to_owned();
        Box::pin(async move {
            match tokio::fs::remove_file(path?).await {
                Ok(()) => {
                    tracing::info!(session_id = %session_id, "session deleted");
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn search_sessions(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SessionSummary>, MemoryError>> {
        let query = query.to_owned();
        Box::pin(async move {
            Ok(self
                .sessions_newest_first()
                .await?
                .iter()
                .filter(|s| s.mentions(&query))
                .take(limit)
                .map(Session::summary)
                .collect())
        })
    }

    fn last_session_id(&self) -> BoxFuture<'_, Result<Option<String>, MemoryError>> {
        Box::pin(async move {
            for path in self.files_newest_first().await? {
                if let Ok(session) = Self::read_file(&path).await {
                    return Ok(Some(session.session_id));
                }
            }
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn store() -> (tempfile::TempDir, JsonSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path().join("sessions")).await.unwrap();
        (dir, store)
    }

    fn touch(store: &JsonSessionStore, id: &str, secs: u64) {
        let path = store.dir().join(format!("{id}.json"));
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn messages(texts: &[&str]) -> Vec<StoredMessage> {
        texts.iter().map(|t| StoredMessage::new("user", *t)).collect()
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let (_dir, store) = store().await;
        let saved = store
            .save_session("s1", messages(&["hello", "open firefox"]), Map::new())
            .await
            .unwrap();
        let loaded = store.load_session("s1").await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.message_count, 2);
        assert!(!store.dir().join("s1.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_is_pretty_json() {
        let (_dir, store) = store().await;
        store
            .save_session("s1", messages(&["hi"]), Map::new())
            .await
            .unwrap();
        let raw = std::fs::read_to_string(store.dir().join("s1.json")).unwrap();
        assert!(raw.contains("\n  \"session_id\": \"s1\""));
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let (_dir, store) = store().await;
        assert!(store.load_session("nope").await.unwrap().is_none());
        assert!(!store.delete_session("nope").await.unwrap());
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let (_dir, store) = store().await;
        let err = store
            .save_session("../escape", Vec::new(), Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::InvalidId(_)));
        assert!(matches!(
            store.load_session("a/b").await,
            Err(MemoryError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn list_orders_by_modification_time() {
        let (_dir, store) = store().await;
        for (id, secs) in [("old", 100), ("new", 300), ("mid", 200)] {
            store.save_session(id, messages(&["x"]), Map::new()).await.unwrap();
            touch(&store, id, secs);
        }
        let ids: Vec<String> = store
            .list_sessions(10)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        assert_eq!(store.list_sessions(1).await.unwrap().len(), 1);
        assert_eq!(store.last_session_id().await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_limited() {
        let (_dir, store) = store().await;
        store
            .save_session("a", messages(&["Turn on the LIGHTS"]), Map::new())
            .await
            .unwrap();
        touch(&store, "a", 100);
        store
            .save_session("b", messages(&["lights off please"]), Map::new())
            .await
            .unwrap();
        touch(&store, "b", 200);
        store
            .save_session("c", messages(&["weather?"]), Map::new())
            .await
            .unwrap();

        let hits = store.search_sessions("lights", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(store.search_sessions("lights", 1).await.unwrap().len(), 1);
        assert!(store.search_sessions("snow", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped() {
        let (_dir, store) = store().await;
        store
            .save_session("good", messages(&["x"]), Map::new())
            .await
            .unwrap();
        touch(&store, "good", 100);
        std::fs::write(store.dir().join("bad.json"), "{not json").unwrap();
        touch(&store, "bad", 200);

        let listed = store.list_sessions(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.last_session_id().await.unwrap().as_deref(), Some("good"));
        assert!(matches!(
            store.load_session("bad").await,
            Err(MemoryError::Json(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let (_dir, store) = store().await;
        store.save_session("s1", Vec::new(), Map::new()).await.unwrap();
        assert!(store.delete_session("s1").await.unwrap());
        assert!(store.load_session("s1").await.unwrap().is_none());
        assert!(store.last_session_id().await.unwrap().is_none());
    }
}
