use std::path::PathBuf;

use jarvis_resilience::{HealthCheck, OfflineConfig, RetryConfig};
use jarvis_tools::ToolsConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub offline: OfflineConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_llm_model() -> String {
    "llama3.1:8b".into()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_temperature() -> f64 {
    0.7
}

/// Ollama-compatible chat backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Seconds before a single chat request is abandoned.
    #[serde(default = "default_llm_timeout")]
    pub timeout: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout: default_llm_timeout(),
            temperature: default_temperature(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WhitelistConfig {
    /// Defaults to `<config dir>/jarvis/whitelist.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl WhitelistConfig {
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("jarvis")
                .join("whitelist.json")
        })
    }
}

fn default_true() -> bool {
    true
}

/// `[retry]`: one policy per guarded service. Disabling makes every call single-shot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "RetryConfig::network")]
    pub llm: RetryConfig,
    #[serde(default = "RetryConfig::network")]
    pub web: RetryConfig,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            llm: RetryConfig::network(),
            web: RetryConfig::network(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_audio_device_glob() -> String {
    jarvis_resilience::health::DEFAULT_AUDIO_DEVICE_GLOB.into()
}

/// `[health]`: startup probes. The LLM and audio probes are always derived from the rest of
/// the config; `checks` adds arbitrary extra ones.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
    #[serde(default = "default_audio_device_glob")]
    pub audio_device_glob: String,
    /// Piper (or other) TTS binary checked for the `tts` service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_binary: Option<PathBuf>,
    /// Executable checked for the `stt` service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stt_command: Option<String>,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_timeout: default_probe_timeout(),
            audio_device_glob: default_audio_device_glob(),
            tts_binary: None,
            stt_command: None,
            checks: Vec::new(),
        }
    }
}

fn default_list_limit() -> usize {
    10
}

/// `[memory]`: conversation sessions. Disabled means sessions live only for the process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `<data dir>/jarvis/sessions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            list_limit: default_list_limit(),
        }
    }
}

impl MemoryConfig {
    #[must_use]
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("jarvis")
                .join("sessions")
        })
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}
