//! Application wiring: whitelist, gate, executor, guards and session store from a [`Config`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jarvis_gate::{ConfirmationGate, ConfirmationHandler, WhitelistStore};
use jarvis_memory::{InMemorySessionStore, JsonSessionStore, SessionStore, StoredMessage};
use jarvis_resilience::{
    DegradedState, HealthCheck, HealthChecker, HealthReport, OfflineResponder, Probe, Reply,
    RetryConfig, RetryPolicy, ServiceGuard, service,
};
use jarvis_tools::{ActionExecutor, AuditLogger};

use crate::config::{Config, RetrySection};
use crate::llm::{ChatMessage, LlmClient};

/// Policy for one service; a disabled `[retry]` section means a single attempt.
#[must_use]
pub fn retry_policy(section: &RetrySection, config: &RetryConfig) -> RetryPolicy {
    if section.enabled {
        RetryPolicy::from(config)
    } else {
        RetryPolicy::no_retry()
    }
}

/// Everything a front end needs, built once per process.
pub struct AppContext {
    config: Config,
    state: Arc<DegradedState>,
    gate: Arc<ConfirmationGate>,
    executor: ActionExecutor,
    llm: LlmClient,
    llm_guard: ServiceGuard,
    responder: OfflineResponder,
    health: HealthChecker,
    sessions: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("state", &self.state)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Validate `config` and construct the shared components. Without a `handler` the gate
    /// fails closed for anything not already whitelisted.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config, an audit log that cannot be opened, or a session
    /// directory that cannot be created.
    pub async fn build(
        config: Config,
        handler: Option<Arc<dyn ConfirmationHandler>>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let state = Arc::new(DegradedState::new());
        if config.offline.start_offline {
            state.enable_offline();
        }

        let whitelist = Arc::new(WhitelistStore::load(config.whitelist.resolved_path()));
        let mut gate = ConfirmationGate::new(whitelist);
        if let Some(handler) = handler {
            gate = gate.with_handler(handler);
        }
        let gate = Arc::new(gate);

        let mut executor =
            ActionExecutor::new(&config.tools, Arc::clone(&gate), Arc::clone(&state))
                .with_web_retry(retry_policy(&config.retry, &config.retry.web));
        if config.tools.audit.enabled {
            let logger = AuditLogger::from_config(&config.tools.audit)
                .await
                .with_context(|| {
                    format!("failed to open audit log {}", config.tools.audit.destination)
                })?;
            executor = executor.with_audit(logger);
        }

        let sessions: Arc<dyn SessionStore> = if config.memory.enabled {
            let dir = config.memory.resolved_directory();
            Arc::new(
                JsonSessionStore::open(&dir)
                    .await
                    .with_context(|| format!("failed to open session store {}", dir.display()))?,
            )
        } else {
            Arc::new(InMemorySessionStore::new())
        };

        let llm = LlmClient::new(&config.llm);
        let llm_guard = ServiceGuard::new(
            retry_policy(&config.retry, &config.retry.llm),
            Arc::clone(&state),
        );
        let responder = OfflineResponder::new(config.offline.clone());
        let health = HealthChecker::new(Duration::from_secs(config.health.probe_timeout))
            .with_audio_device_glob(config.health.audio_device_glob.clone());

        tracing::info!(
            allowed_directories = ?config.tools.allowed_directories,
            headless = !gate.has_handler(),
            offline = state.is_offline(),
            "jarvis initialized"
        );

        Ok(Self {
            config,
            state,
            gate,
            executor,
            llm,
            llm_guard,
            responder,
            health,
            sessions,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &Arc<DegradedState> {
        &self.state
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }

    #[must_use]
    pub fn whitelist(&self) -> &Arc<WhitelistStore> {
        self.gate.store()
    }

    #[must_use]
    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    #[must_use]
    pub fn responder(&self) -> &OfflineResponder {
        &self.responder
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Probes for the configured services: the LLM backend and audio input always, the TTS
    /// binary and STT command when configured, then any extra `[[health.checks]]`.
    #[must_use]
    pub fn health_checks(&self) -> Vec<HealthCheck> {
        let health = &self.config.health;
        let mut checks = vec![
            HealthCheck::new(
                service::LLM,
                Probe::LlmBackend {
                    base_url: self.llm.base_url().to_owned(),
                },
            ),
            HealthCheck::new(service::AUDIO, Probe::AudioInput),
        ];
        if let Some(path) = &health.tts_binary {
            checks.push(HealthCheck::new(
                service::TTS,
                Probe::File { path: path.clone() },
            ));
        }
        if let Some(name) = &health.stt_command {
            checks.push(HealthCheck::new(
                service::STT,
                Probe::Command { name: name.clone() },
            ));
        }
        checks.extend(health.checks.iter().cloned());
        checks
    }

    /// Run every health check and update the degraded-mode tracker.
    pub async fn startup_sweep(&self) -> HealthReport {
        if !self.config.health.enabled {
            tracing::debug!("health checks disabled");
            return HealthReport::default();
        }
        tracing::info!("performing service health checks");
        let report = self.health.sweep(&self.health_checks(), &self.state).await;
        if !report.all_healthy() {
            tracing::warn!(
                unavailable = ?report.unhealthy_services(),
                "some services are unavailable, affected features run degraded"
            );
        }
        report
    }

    /// Answer the last message of `history` through the LLM, degrading to cached or canned
    /// replies when the backend is unavailable. Never fails.
    pub async fn ask(&self, history: &[ChatMessage]) -> Reply {
        let prompt = history
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map_or("", |m| m.content.as_str());
        self.responder
            .answer(&self.llm_guard, prompt, || self.llm.chat(history))
            .await
    }

    /// Append `prompt` and the reply to session `session_id` (created if missing) and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be loaded or saved.
    pub async fn ask_in_session(&self, session_id: &str, prompt: &str) -> anyhow::Result<Reply> {
        let existing = self
            .sessions
            .load_session(session_id)
            .await
            .with_context(|| format!("failed to load session {session_id}"))?;
        let (mut messages, metadata) = match existing {
            Some(session) => (session.messages, session.metadata),
            None => (Vec::new(), serde_json::Map::new()),
        };
        messages.push(StoredMessage::new("user", prompt));

        let history: Vec<ChatMessage> = messages
            .iter()
            .map(|m| ChatMessage::new(m.role.clone(), m.content.clone()))
            .collect();
        let reply = self.ask(&history).await;

        let mut answer = StoredMessage::new("assistant", reply.text.clone());
        answer.metadata.insert(
            "source".into(),
            serde_json::to_value(reply.source).unwrap_or_default(),
        );
        messages.push(answer);
        self.sessions
            .save_session(session_id, messages, metadata)
            .await
            .with_context(|| format!("failed to save session {session_id}"))?;
        Ok(reply)
    }
}
