use serde::{Deserialize, Deserializer, Serialize};

use crate::launch::DEFAULT_GUI_APPLICATIONS;

fn default_allowed_directories() -> Vec<String> {
    vec!["/home".to_owned(), "/tmp".to_owned()]
}

fn default_command_whitelist() -> Vec<String> {
    ["ls", "cat", "mkdir", "touch", "rm", "echo", "code", "firefox", "nautilus"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_gui_applications() -> Vec<String> {
    DEFAULT_GUI_APPLICATIONS
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringList {
    List(Vec<String>),
    Joined(String),
}

/// Accepts either a TOML array or a comma-separated string.
fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match StringList::deserialize(deserializer)? {
        StringList::List(items) => items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        StringList::Joined(raw) => split_comma_list(&raw),
    })
}

/// `[tools]` section: sandbox roots, command allow-list and per-action limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(
        default = "default_allowed_directories",
        deserialize_with = "string_list"
    )]
    pub allowed_directories: Vec<String>,
    #[serde(default = "default_command_whitelist", deserialize_with = "string_list")]
    pub command_whitelist: Vec<String>,
    /// Commands launched detached instead of awaited.
    #[serde(default = "default_gui_applications", deserialize_with = "string_list")]
    pub gui_applications: Vec<String>,
    #[serde(default)]
    pub launch: LaunchConfig,
    #[serde(default)]
    pub file: FileConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_directories: default_allowed_directories(),
            command_whitelist: default_command_whitelist(),
            gui_applications: default_gui_applications(),
            launch: LaunchConfig::default(),
            file: FileConfig::default(),
            fetch: FetchConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

fn default_launch_timeout() -> u64 {
    5
}

fn default_max_output_chars() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Seconds a non-GUI command may run before it is killed.
    #[serde(default = "default_launch_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            timeout: default_launch_timeout(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

fn default_max_list_entries() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_max_output_chars")]
    pub max_read_chars: usize,
    #[serde(default = "default_max_list_entries")]
    pub max_list_entries: usize,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_read_chars: default_max_output_chars(),
            max_list_entries: default_max_list_entries(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    15
}

fn default_max_body_bytes() -> usize {
    1_048_576
}

fn default_max_text_chars() -> usize {
    2000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Permit loopback, private and link-local hosts.
    #[serde(default)]
    pub allow_private_hosts: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            max_body_bytes: default_max_body_bytes(),
            max_text_chars: default_max_text_chars(),
            allow_private_hosts: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_audit_destination() -> String {
    "stdout".into()
}

/// Action audit trail: `stdout` routes through `tracing`, anything else is a file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: default_audit_destination(),
        }
    }
}
