use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MemoryError;

const DEFAULT_LANGUAGE: &str = "auto";

/// Fresh random session identifier.
#[must_use]
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Session ids become file names, so only `[A-Za-z0-9._-]` is accepted and a leading dot is not.
///
/// # Errors
///
/// Returns [`MemoryError::InvalidId`] for empty, path-like or otherwise unsafe ids.
pub fn validate_session_id(id: &str) -> Result<(), MemoryError> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(MemoryError::InvalidId(id.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StoredMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub message_count: usize,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_owned()
}

fn metadata_time(metadata: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = metadata.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl Session {
    /// Build a session record. `started_at`, `ended_at` (RFC 3339) and `language` are taken from
    /// `metadata` when present; timestamps default to now and the language to `auto`.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        messages: Vec<StoredMessage>,
        metadata: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        let started_at = metadata_time(&metadata, "started_at").unwrap_or(now);
        let ended_at = metadata_time(&metadata, "ended_at").unwrap_or(now);
        let language = metadata
            .get("language")
            .and_then(Value::as_str)
            .map_or_else(default_language, str::to_owned);
        Self {
            session_id: session_id.into(),
            started_at,
            ended_at,
            message_count: messages.len(),
            language,
            metadata,
            messages,
        }
    }

    /// Case-insensitive substring match over message content.
    #[must_use]
    pub fn mentions(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.messages
            .iter()
            .any(|m| m.content.to_lowercase().contains(&needle))
    }

    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            message_count: self.message_count,
            language: self.language.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub message_count: usize,
    pub language: String,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}  {}  {} messages  [{}]",
            self.session_id,
            self.started_at.format("%Y-%m-%d %H:%M"),
            self.message_count,
            self.language
        )
    }
}
