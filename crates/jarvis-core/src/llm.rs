//! Minimal client for an Ollama-compatible `/api/chat` endpoint.

use std::time::Duration;

use jarvis_resilience::{Classify, FailureKind, Reply};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM backend returned {0}")]
    Status(reqwest::StatusCode),

    #[error("empty response from LLM backend")]
    EmptyResponse,
}

impl Classify for LlmError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Http(e) => e.failure_kind(),
            Self::Status(s) if *s == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                FailureKind::RateLimited
            }
            Self::Status(s) if s.is_server_error() => FailureKind::ServerError,
            Self::Status(_) => FailureKind::ClientError,
            Self::EmptyResponse => FailureKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    system_prompt: Option<String>,
}

impl LlmClient {
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One non-streaming chat completion over `history`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport failures, non-2xx statuses, or a response without
    /// a message.
    pub async fn chat(&self, history: &[ChatMessage]) -> Result<Reply, LlmError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::new("system", system.clone()));
        }
        messages.extend_from_slice(history);

        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status));
        }
        let parsed: ChatResponse = response.json().await?;
        let Some(message) = parsed.message else {
            return Err(LlmError::EmptyResponse);
        };
        tracing::debug!(model = %self.model, chars = message.content.len(), "llm replied");
        Ok(Reply::live(message.content, !message.tool_calls.is_empty()))
    }
}
