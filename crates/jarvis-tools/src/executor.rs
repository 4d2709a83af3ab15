use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use jarvis_gate::{ConfirmationGate, ConfirmationRequest};
use jarvis_resilience::{DegradedState, RetryConfig, RetryPolicy, ServiceGuard};
use serde::{Deserialize, Deserializer, Serialize};

use crate::audit::{AuditEntry, AuditLogger, AuditResult};
use crate::config::{FileConfig, LaunchConfig, ToolsConfig};
use crate::fetch::{FetchError, WebFetcher};
use crate::launch::CommandPolicy;
use crate::sandbox::PathSandbox;

const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Cut `output` to at most `max_chars` characters, appending a truncation marker.
#[must_use]
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    match output.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &output[..byte_idx]),
        None => output.to_owned(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    CreateFile,
    ReadFile,
    DeleteFile,
    CreateDirectory,
    DeleteDirectory,
    ListDirectory,
}

impl FileOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateFile => "create_file",
            Self::ReadFile => "read_file",
            Self::DeleteFile => "delete_file",
            Self::CreateDirectory => "create_directory",
            Self::DeleteDirectory => "delete_directory",
            Self::ListDirectory => "list_directory",
        }
    }

    #[must_use]
    pub fn is_deletion(self) -> bool {
        matches!(self, Self::DeleteFile | Self::DeleteDirectory)
    }

    /// Operations that change the filesystem and therefore pass through the gate.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::ReadFile | Self::ListDirectory)
    }
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single action requested by the user or the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionRequest {
    FileOperation {
        operation: FileOperation,
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    LaunchApplication {
        application: String,
        #[serde(default, deserialize_with = "null_as_empty")]
        args: Vec<String>,
    },
    FetchWebPage {
        url: String,
    },
}

impl ActionRequest {
    /// Map an LLM tool call onto a request. `arguments` may be a JSON object or a string
    /// holding one.
    ///
    /// # Errors
    ///
    /// [`ActionError::UnknownTool`] for an unrecognised name, [`ActionError::InvalidParams`] for
    /// malformed arguments.
    pub fn from_tool_call(name: &str, arguments: &serde_json::Value) -> Result<Self, ActionError> {
        let kind = match name {
            "execute_file_operation" => "file_operation",
            "launch_application" => "launch_application",
            "fetch_web_page" => "fetch_web_page",
            other => return Err(ActionError::UnknownTool(other.to_owned())),
        };
        let value = match arguments {
            serde_json::Value::String(raw) => serde_json::from_str(raw)
                .map_err(|e| ActionError::InvalidParams(format!("arguments are not JSON: {e}")))?,
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        let serde_json::Value::Object(mut map) = value else {
            return Err(ActionError::InvalidParams(
                "arguments must be a JSON object".to_owned(),
            ));
        };
        map.insert("kind".to_owned(), serde_json::Value::from(kind));
        serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| ActionError::InvalidParams(e.to_string()))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileOperation { .. } => "file_operation",
            Self::LaunchApplication { .. } => "launch_application",
            Self::FetchWebPage { .. } => "fetch_web_page",
        }
    }

    /// Short human-readable target used in logs and the audit trail.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::FileOperation {
                operation, path, ..
            } => format!("{operation} {path}"),
            Self::LaunchApplication { application, args } => command_line(application, args),
            Self::FetchWebPage { url } => url.clone(),
        }
    }
}

pub(crate) fn command_line(application: &str, args: &[String]) -> String {
    if args.is_empty() {
        application.to_owned()
    } else {
        format!("{application} {}", args.join(" "))
    }
}

/// Outcome of an action, rendered as a bounded human-readable string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Success(String),
    Denied(String),
    /// Carries the description of the action the user declined.
    Cancelled(String),
    Error(String),
}

impl ActionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    fn audit(&self) -> AuditResult {
        match self {
            Self::Success(_) => AuditResult::Success,
            Self::Denied(reason) => AuditResult::Denied {
                reason: reason.clone(),
            },
            Self::Cancelled(_) => AuditResult::Cancelled,
            Self::Error(message) => AuditResult::Error {
                message: message.clone(),
            },
        }
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(message) => f.write_str(message),
            Self::Denied(reason) => write!(f, "Error: {reason}"),
            Self::Cancelled(description) => write!(f, "Action cancelled by user: {description}"),
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Path '{path}' is not in allowed directories")]
    PathDenied { path: String },

    #[error("Command '{command}' is not in whitelist")]
    CommandNotAllowed { command: String },

    #[error("cancelled: {description}")]
    UserCancelled { description: String },

    #[error("no confirmation handler configured, denied: {description}")]
    NoHandlerConfigured { description: String },

    #[error("{0}")]
    Blocked(String),

    #[error("Command timed out: {command}")]
    SubprocessTimeout { command: String },

    #[error("Unable to fetch {url} after {attempts} attempts")]
    RetryExhausted { url: String, attempts: u32 },

    #[error("Offline mode, not fetching {url}")]
    Offline { url: String },

    #[error("Error fetching web page: {0}")]
    Fetch(#[source] FetchError),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ActionError {
    #[must_use]
    pub fn into_result(self) -> ActionResult {
        match self {
            Self::UserCancelled { description } => ActionResult::Cancelled(description),
            Self::PathDenied { .. }
            | Self::CommandNotAllowed { .. }
            | Self::NoHandlerConfigured { .. }
            | Self::Blocked(_)
            | Self::Offline { .. } => ActionResult::Denied(self.to_string()),
            other => ActionResult::Error(other.to_string()),
        }
    }
}

impl From<ActionError> for ActionResult {
    fn from(err: ActionError) -> Self {
        err.into_result()
    }
}

/// Runs file, command and web actions behind the sandbox, allow-list and confirmation gate.
///
/// Every public entry point returns an [`ActionResult`]; internal errors never escape.
pub struct ActionExecutor {
    pub(crate) gate: Arc<ConfirmationGate>,
    pub(crate) sandbox: PathSandbox,
    pub(crate) commands: CommandPolicy,
    pub(crate) file: FileConfig,
    pub(crate) launch: LaunchConfig,
    pub(crate) fetcher: WebFetcher,
    pub(crate) allow_private_hosts: bool,
    pub(crate) web_guard: ServiceGuard,
    audit: Option<AuditLogger>,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("gate", &self.gate)
            .field("sandbox", &self.sandbox)
            .field("commands", &self.commands)
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    #[must_use]
    pub fn new(config: &ToolsConfig, gate: Arc<ConfirmationGate>, state: Arc<DegradedState>) -> Self {
        Self {
            gate,
            sandbox: PathSandbox::new(&config.allowed_directories),
            commands: CommandPolicy::new(&config.command_whitelist, &config.gui_applications),
            file: config.file.clone(),
            launch: config.launch.clone(),
            fetcher: WebFetcher::new(&config.fetch),
            allow_private_hosts: config.fetch.allow_private_hosts,
            web_guard: ServiceGuard::new(RetryPolicy::from(&RetryConfig::network()), state),
            audit: None,
        }
    }

    /// Replace the retry policy used for web fetches.
    #[must_use]
    pub fn with_web_retry(mut self, policy: RetryPolicy) -> Self {
        let state = Arc::clone(self.web_guard.state());
        self.web_guard = ServiceGuard::new(policy, state);
        self
    }

    #[must_use]
    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    #[must_use]
    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }

    #[must_use]
    pub fn state(&self) -> &Arc<DegradedState> {
        self.web_guard.state()
    }

    /// Execute `request` and render the outcome.
    pub async fn execute(&self, request: &ActionRequest) -> ActionResult {
        let start = Instant::now();
        let outcome = match request {
            ActionRequest::FileOperation {
                operation,
                path,
                content,
            } => {
                self.execute_file_operation(*operation, path, content.as_deref())
                    .await
            }
            ActionRequest::LaunchApplication { application, args } => {
                self.launch_application(application, args).await
            }
            ActionRequest::FetchWebPage { url } => self.fetch_web_page(url).await,
        };
        let result = match outcome {
            Ok(message) => ActionResult::Success(message),
            Err(e) => {
                tracing::warn!(kind = request.kind(), target = %request.target(), "action failed: {e}");
                e.into_result()
            }
        };
        self.record(request, &result, start).await;
        result
    }

    /// Execute an LLM tool call by name.
    pub async fn execute_tool_call(&self, name: &str, arguments: &serde_json::Value) -> ActionResult {
        tracing::info!(tool = name, "executing tool call");
        match ActionRequest::from_tool_call(name, arguments) {
            Ok(request) => self.execute(&request).await,
            Err(e) => e.into_result(),
        }
    }

    /// Ask the gate, on a blocking thread since the handler may wait for a human.
    pub(crate) async fn confirm(&self, request: ConfirmationRequest) -> Result<(), ActionError> {
        let gate = Arc::clone(&self.gate);
        let has_handler = gate.has_handler();
        let description = request.description.clone();
        let decision = tokio::task::spawn_blocking(move || gate.authorize(&request))
            .await
            .map_err(|e| ActionError::Failed(format!("confirmation task failed: {e}")))?;

        if decision.execute {
            Ok(())
        } else if has_handler {
            Err(ActionError::UserCancelled { description })
        } else {
            Err(ActionError::NoHandlerConfigured { description })
        }
    }

    async fn record(&self, request: &ActionRequest, result: &ActionResult, start: Instant) {
        let Some(logger) = &self.audit else {
            return;
        };
        let entry = AuditEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind: request.kind().to_owned(),
            target: request.target(),
            result: result.audit(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        logger.log(&entry).await;
    }
}
