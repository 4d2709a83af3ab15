use std::path::PathBuf;

use jarvis_tools::split_comma_list;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_core();
        self.apply_env_overrides_tools();
    }

    fn apply_env_overrides_core(&mut self) {
        if let Ok(v) = std::env::var("JARVIS_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("JARVIS_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("JARVIS_LLM_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.llm.timeout = secs;
        }
        if let Ok(v) = std::env::var("JARVIS_WHITELIST_PATH") {
            self.whitelist.path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("JARVIS_RETRY_ENABLED") {
            if let Ok(enabled) = v.parse::<bool>() {
                self.retry.enabled = enabled;
            } else {
                tracing::warn!("ignoring invalid JARVIS_RETRY_ENABLED value: {v}");
            }
        }
        if let Ok(v) = std::env::var("JARVIS_RETRY_MAX_ATTEMPTS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.retry.llm.max_attempts = n;
            self.retry.web.max_attempts = n;
        }
        if let Ok(v) = std::env::var("JARVIS_OFFLINE")
            && let Ok(offline) = v.parse::<bool>()
        {
            self.offline.start_offline = offline;
        }
        if let Ok(v) = std::env::var("JARVIS_HEALTH_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.health.enabled = enabled;
        }
        if let Ok(v) = std::env::var("JARVIS_TTS_BINARY") {
            self.health.tts_binary = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("JARVIS_SESSIONS_DIR") {
            self.memory.directory = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("JARVIS_MEMORY_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.memory.enabled = enabled;
        }
        if let Ok(v) = std::env::var("JARVIS_LOG_LEVEL") {
            self.logging.level = v.to_lowercase();
        }
        if let Ok(v) = std::env::var("JARVIS_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
    }

    fn apply_env_overrides_tools(&mut self) {
        if let Ok(v) = std::env::var("JARVIS_ALLOWED_DIRECTORIES") {
            self.tools.allowed_directories = split_comma_list(&v);
        }
        if let Ok(v) = std::env::var("JARVIS_COMMAND_WHITELIST") {
            self.tools.command_whitelist = split_comma_list(&v);
        }
        if let Ok(v) = std::env::var("JARVIS_GUI_APPLICATIONS") {
            self.tools.gui_applications = split_comma_list(&v);
        }
        if let Ok(v) = std::env::var("JARVIS_TOOLS_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.tools.launch.timeout = secs;
        }
        if let Ok(v) = std::env::var("JARVIS_FETCH_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.tools.fetch.timeout = secs;
        }
        if let Ok(v) = std::env::var("JARVIS_FETCH_ALLOW_PRIVATE_HOSTS")
            && let Ok(allow) = v.parse::<bool>()
        {
            self.tools.fetch.allow_private_hosts = allow;
        }
        if let Ok(v) = std::env::var("JARVIS_AUDIT_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.tools.audit.enabled = enabled;
        }
        if let Ok(v) = std::env::var("JARVIS_AUDIT_DESTINATION") {
            self.tools.audit.destination = v;
        }
    }
}
