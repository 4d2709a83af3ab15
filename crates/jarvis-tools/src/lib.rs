//! Gated file, command and web actions.

pub mod audit;
pub mod config;
pub mod executor;
pub mod fetch;
pub mod file;
pub mod launch;
pub mod sandbox;

pub use audit::{AuditEntry, AuditLogger, AuditResult};
pub use config::{AuditConfig, FetchConfig, FileConfig, LaunchConfig, ToolsConfig, split_comma_list};
pub use executor::{
    ActionError, ActionExecutor, ActionRequest, ActionResult, FileOperation, truncate_output,
};
pub use fetch::{FetchError, WebFetcher, extract_readable_text, is_private_host, url_key};
pub use launch::{CommandPolicy, DANGEROUS_COMMANDS, DEFAULT_GUI_APPLICATIONS};
pub use sandbox::{PathSandbox, expand_tilde};
