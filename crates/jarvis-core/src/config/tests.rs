use std::io::Write;

use jarvis_resilience::{FailureKind, Probe};
use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 22] = [
    "JARVIS_CONFIG",
    "JARVIS_LLM_BASE_URL",
    "JARVIS_LLM_MODEL",
    "JARVIS_LLM_TIMEOUT",
    "JARVIS_WHITELIST_PATH",
    "JARVIS_RETRY_ENABLED",
    "JARVIS_RETRY_MAX_ATTEMPTS",
    "JARVIS_OFFLINE",
    "JARVIS_HEALTH_ENABLED",
    "JARVIS_TTS_BINARY",
    "JARVIS_SESSIONS_DIR",
    "JARVIS_MEMORY_ENABLED",
    "JARVIS_LOG_LEVEL",
    "JARVIS_LOG_FILE",
    "JARVIS_ALLOWED_DIRECTORIES",
    "JARVIS_COMMAND_WHITELIST",
    "JARVIS_GUI_APPLICATIONS",
    "JARVIS_TOOLS_TIMEOUT",
    "JARVIS_FETCH_TIMEOUT",
    "JARVIS_FETCH_ALLOW_PRIVATE_HOSTS",
    "JARVIS_AUDIT_ENABLED",
    "JARVIS_AUDIT_DESTINATION",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.llm.base_url, "http://localhost:11434");
    assert_eq!(config.llm.model, "llama3.1:8b");
    assert_eq!(config.tools.allowed_directories, vec!["/home", "/tmp"]);
    assert!(config.retry.enabled);
    assert_eq!(config.retry.llm.max_attempts, 3);
    assert_eq!(config.retry.web.initial_delay_ms, 2000);
    assert!((config.retry.web.backoff_factor - 2.0).abs() < f64::EPSILON);
    assert!(config.offline.enabled);
    assert_eq!(config.offline.cache_size, 50);
    assert!(config.health.enabled);
    assert_eq!(config.memory.list_limit, 10);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_yields_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/jarvis.toml")).unwrap();
    assert_eq!(config.llm.model, "llama3.1:8b");
}

#[test]
#[serial]
fn parses_full_file() {
    clear_env();
    let file = write_config(
        r#"
[llm]
base_url = "http://gpu-box:11434"
model = "mistral:7b"

[tools]
allowed_directories = "/srv/share, /tmp"
command_whitelist = ["ls", "echo"]

[tools.fetch]
max_text_chars = 500

[whitelist]
path = "/var/lib/jarvis/whitelist.json"

[retry]
enabled = true

[retry.llm]
max_attempts = 5
initial_delay_ms = 100
retry_on = ["timeout", "connect"]

[offline]
cache_size = 10
start_offline = true

[health]
tts_binary = "/opt/piper/piper"

[[health.checks]]
service = "stt"
probe = "command"
name = "whisper"

[memory]
directory = "/var/lib/jarvis/sessions"

[logging]
level = "debug"
file = "/var/log/jarvis.log"
"#,
    );
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.llm.base_url, "http://gpu-box:11434");
    assert_eq!(config.tools.allowed_directories, vec!["/srv/share", "/tmp"]);
    assert_eq!(config.tools.command_whitelist, vec!["ls", "echo"]);
    assert_eq!(config.tools.fetch.max_text_chars, 500);
    assert_eq!(
        config.whitelist.resolved_path(),
        PathBuf::from("/var/lib/jarvis/whitelist.json")
    );
    assert_eq!(config.retry.llm.max_attempts, 5);
    assert_eq!(
        config.retry.llm.retry_on,
        vec![FailureKind::Timeout, FailureKind::Connect]
    );
    assert_eq!(config.retry.web.initial_delay_ms, 2000);
    assert_eq!(config.offline.cache_size, 10);
    assert!(config.offline.start_offline);
    assert_eq!(
        config.health.checks[0].probe,
        Probe::Command {
            name: "whisper".into()
        }
    );
    assert_eq!(
        config.memory.resolved_directory(),
        PathBuf::from("/var/lib/jarvis/sessions")
    );
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    clear_env();
    let file = write_config("[llm\nmodel = ");
    let err = Config::load(file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse config file"));
}

#[test]
#[serial]
fn env_overrides_lists_and_flags() {
    clear_env();
    unsafe {
        std::env::set_var("JARVIS_ALLOWED_DIRECTORIES", "/data, ~/notes");
        std::env::set_var("JARVIS_COMMAND_WHITELIST", "ls,git");
        std::env::set_var("JARVIS_RETRY_ENABLED", "false");
        std::env::set_var("JARVIS_OFFLINE", "true");
        std::env::set_var("JARVIS_LLM_MODEL", "qwen2.5:3b");
        std::env::set_var("JARVIS_LOG_LEVEL", "WARN");
        std::env::set_var("JARVIS_FETCH_ALLOW_PRIVATE_HOSTS", "true");
    }
    let config = Config::load(Path::new("/nonexistent/jarvis.toml")).unwrap();
    clear_env();

    assert_eq!(config.tools.allowed_directories, vec!["/data", "~/notes"]);
    assert_eq!(config.tools.command_whitelist, vec!["ls", "git"]);
    assert!(!config.retry.enabled);
    assert!(config.offline.start_offline);
    assert_eq!(config.llm.model, "qwen2.5:3b");
    assert_eq!(config.logging.level, "warn");
    assert!(config.tools.fetch.allow_private_hosts);
}

#[test]
#[serial]
fn env_overrides_beat_file() {
    clear_env();
    let file = write_config("[llm]\nmodel = \"from-file\"\n");
    unsafe { std::env::set_var("JARVIS_LLM_MODEL", "from-env") };
    let config = Config::load(file.path()).unwrap();
    clear_env();
    assert_eq!(config.llm.model, "from-env");
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("JARVIS_RETRY_ENABLED", "sometimes");
        std::env::set_var("JARVIS_TOOLS_TIMEOUT", "soon");
    }
    let config = Config::load(Path::new("/nonexistent/jarvis.toml")).unwrap();
    clear_env();
    assert!(config.retry.enabled);
    assert_eq!(config.tools.launch.timeout, 5);
}

#[test]
fn validation_rejects_bad_retry_settings() {
    let mut config = Config::default();
    config.retry.web.max_attempts = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retry.llm.backoff_factor = 0.5;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("retry.llm.backoff_factor"));

    let mut config = Config::default();
    config.retry.llm.max_delay_ms = 10;
    assert!(config.validate().is_err());
}

#[test]
fn validation_requires_allowed_directory() {
    let mut config = Config::default();
    config.tools.allowed_directories.clear();
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn config_path_resolution() {
    clear_env();
    assert_eq!(
        resolve_config_path(Some(Path::new("/etc/jarvis.toml"))),
        PathBuf::from("/etc/jarvis.toml")
    );
    assert_eq!(resolve_config_path(None), PathBuf::from("config/default.toml"));
    unsafe { std::env::set_var("JARVIS_CONFIG", "/opt/jarvis.toml") };
    assert_eq!(resolve_config_path(None), PathBuf::from("/opt/jarvis.toml"));
    clear_env();
}

#[test]
fn default_paths_end_with_jarvis_dirs() {
    let config = Config::default();
    assert!(config.whitelist.resolved_path().ends_with("jarvis/whitelist.json"));
    assert!(config.memory.resolved_directory().ends_with("jarvis/sessions"));
}
