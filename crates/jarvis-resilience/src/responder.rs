//! Degraded answers for the LLM service: a small reply cache plus canned rule-based replies.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::degraded::service;
use crate::error::Classify;
use crate::guard::ServiceGuard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// Serve cached replies while offline and fill the cache from live replies.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Start the process with the offline flag set.
    #[serde(default)]
    pub start_offline: bool,
}

fn default_true() -> bool {
    true
}

fn default_cache_size() -> usize {
    50
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_size: default_cache_size(),
            start_offline: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Live,
    Cache,
    Canned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub has_tool_calls: bool,
    pub source: ReplySource,
}

impl Reply {
    #[must_use]
    pub fn live(text: impl Into<String>, has_tool_calls: bool) -> Self {
        Self {
            text: text.into(),
            has_tool_calls,
            source: ReplySource::Live,
        }
    }

    fn from_cache(text: String) -> Self {
        Self {
            text,
            has_tool_calls: false,
            source: ReplySource::Cache,
        }
    }

    fn canned(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            has_tool_calls: false,
            source: ReplySource::Canned,
        }
    }
}

const GREETING_REPLY: &str = "Hello! I'm currently experiencing connection issues, but I'm still here to help where I can.";
const FAREWELL_REPLY: &str = "Goodbye! I hope to be fully operational soon.";
const HELP_REPLY: &str = "I'm currently in degraded mode. My AI capabilities are limited, but I can still try to help with basic tasks.";
const DEFAULT_REPLY: &str = "I'm sorry, I'm currently unable to process complex requests. My AI service is unavailable. Please try again later.";

const GREETING_WORDS: &[&str] = &["hello", "hi", "hey", "bonjour", "salut"];
const FAREWELL_WORDS: &[&str] = &["exit", "quit", "goodbye", "bye"];
const FAREWELL_PHRASES: &[&str] = &["au revoir"];
const HELP_WORDS: &[&str] = &["help", "aide"];

#[derive(Debug, Default)]
struct Cache {
    order: VecDeque<String>,
    replies: HashMap<String, String>,
}

/// FIFO reply cache keyed by normalized prompt, with canned fallbacks.
#[derive(Debug)]
pub struct OfflineResponder {
    config: OfflineConfig,
    cache: Mutex<Cache>,
}

fn normalize(prompt: &str) -> String {
    prompt.trim().to_lowercase()
}

impl OfflineResponder {
    #[must_use]
    pub fn new(config: OfflineConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Cache `reply` for `prompt`. Replies that carry tool calls are never cached, and the
    /// oldest entry is evicted once the cache is full.
    pub fn remember(&self, prompt: &str, reply: &Reply) {
        if !self.config.enabled || self.config.cache_size == 0 || reply.has_tool_calls {
            return;
        }
        let key = normalize(prompt);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.replies.contains_key(&key) {
            cache.replies.insert(key, reply.text.clone());
            return;
        }
        while cache.order.len() >= self.config.cache_size {
            if let Some(oldest) = cache.order.pop_front() {
                cache.replies.remove(&oldest);
            }
        }
        cache.order.push_back(key.clone());
        cache.replies.insert(key, reply.text.clone());
    }

    #[must_use]
    pub fn cached(&self, prompt: &str) -> Option<Reply> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replies
            .get(&normalize(prompt))
            .cloned()
            .map(Reply::from_cache)
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    /// Canned reply chosen by keyword: greeting, farewell, help, or a generic apology.
    #[must_use]
    pub fn canned_reply(prompt: &str) -> &'static str {
        let lowered = prompt.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |list: &[&str]| words.iter().any(|w| list.iter().any(|k| k == w));

        if has_word(GREETING_WORDS) {
            GREETING_REPLY
        } else if has_word(FAREWELL_WORDS) || FAREWELL_PHRASES.iter().any(|p| lowered.contains(p))
        {
            FAREWELL_REPLY
        } else if has_word(HELP_WORDS) {
            HELP_REPLY
        } else {
            DEFAULT_REPLY
        }
    }

    /// Best degraded answer: cached reply if any, canned otherwise. Never fails.
    #[must_use]
    pub fn respond(&self, prompt: &str) -> Reply {
        if let Some(reply) = self.cached(prompt) {
            tracing::info!("using cached response (degraded mode)");
            return reply;
        }
        Reply::canned(Self::canned_reply(prompt))
    }

    /// Answer `prompt` through the LLM service.
    ///
    /// While offline a cached reply short-circuits the call. Otherwise `op` runs under the
    /// guard; a live reply is cached, and any failure degrades to [`respond`](Self::respond).
    pub async fn answer<E, F, Fut>(&self, guard: &ServiceGuard, prompt: &str, op: F) -> Reply
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Reply, E>>,
        E: Classify + Display,
    {
        if self.config.enabled
            && guard.state().is_offline()
            && let Some(reply) = self.cached(prompt)
        {
            tracing::info!("using cached response (offline mode)");
            return reply;
        }

        match guard.call(service::LLM, op).await {
            Ok(reply) => {
                self.remember(prompt, &reply);
                reply
            }
            Err(e) => {
                tracing::error!("llm unavailable, answering in degraded mode: {e}");
                self.respond(prompt)
            }
        }
    }
}

impl Default for OfflineResponder {
    fn default() -> Self {
        Self::new(OfflineConfig::default())
    }
}
