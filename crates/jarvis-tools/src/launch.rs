use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use jarvis_gate::{Category, ConfirmationRequest};
use tokio::process::Command;

use crate::executor::{ActionError, ActionExecutor, command_line, truncate_output};

/// Commands that always prompt, even when whitelisted.
pub const DANGEROUS_COMMANDS: &[&str] = &[
    "rm", "rmdir", "shred", "dd", "mkfs", "fdisk", "kill", "killall", "pkill", "chmod", "chown",
];

pub const DEFAULT_GUI_APPLICATIONS: &[&str] = &["code", "firefox", "nautilus", "gedit"];

/// Command allow-list plus the set of GUI programs launched detached.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    allowed: HashSet<String>,
    gui: HashSet<String>,
}

impl CommandPolicy {
    #[must_use]
    pub fn new(allowed: &[String], gui: &[String]) -> Self {
        Self {
            allowed: allowed.iter().cloned().collect(),
            gui: gui.iter().cloned().collect(),
        }
    }

    /// Exact match against the allow-list; `/usr/bin/rm` does not match `rm`.
    #[must_use]
    pub fn is_allowed(&self, base: &str) -> bool {
        self.allowed.contains(base)
    }

    #[must_use]
    pub fn is_dangerous(base: &str) -> bool {
        DANGEROUS_COMMANDS.contains(&base)
    }

    #[must_use]
    pub fn is_gui(&self, base: &str) -> bool {
        self.gui.contains(base)
    }
}

impl ActionExecutor {
    /// Launch `application` with `args`. `application` may itself carry arguments
    /// (`"ls -la"`); its first word is the command checked against the allow-list.
    ///
    /// Commands are spawned directly, never through a shell.
    ///
    /// # Errors
    ///
    /// [`ActionError::CommandNotAllowed`] before any prompt for a non-whitelisted command, a
    /// cancellation error when the gate declines, [`ActionError::SubprocessTimeout`] when a CLI
    /// command outlives the timeout, or an I/O error when the program cannot be spawned.
    pub async fn launch_application(
        &self,
        application: &str,
        args: &[String],
    ) -> Result<String, ActionError> {
        let mut words = application.split_whitespace();
        let Some(base) = words.next() else {
            return Err(ActionError::InvalidParams("empty application name".to_owned()));
        };
        if !self.commands.is_allowed(base) {
            return Err(ActionError::CommandNotAllowed {
                command: base.to_owned(),
            });
        }

        let full = command_line(application, args);
        let dangerous = CommandPolicy::is_dangerous(base);
        let description = if dangerous {
            format!("⚠ DANGEROUS: {full}")
        } else {
            format!("Launch: {full}")
        };
        self.confirm(
            ConfirmationRequest::new(Category::Applications, description, full.clone())
                .forced(dangerous),
        )
        .await?;

        let argv: Vec<&str> = words.chain(args.iter().map(String::as_str)).collect();
        let mut cmd = Command::new(base);
        cmd.args(&argv).stdin(Stdio::null());

        if self.commands.is_gui(base) {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
            #[cfg(unix)]
            cmd.process_group(0);
            cmd.spawn()?;
            tracing::info!(command = %full, "launched detached");
            return Ok(format!("Launched {application}"));
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn()?;
        let timeout = Duration::from_secs(self.launch.timeout);
        let Ok(output) = tokio::time::timeout(timeout, child.wait_with_output()).await else {
            tracing::warn!(command = %full, timeout_secs = self.launch.timeout, "command timed out");
            return Err(ActionError::SubprocessTimeout {
                command: application.to_owned(),
            });
        };
        let output = output?;

        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            text.push_str("\nErrors: ");
            text.push_str(stderr.trim());
        }
        tracing::info!(command = %full, status = %output.status, "command finished");

        if text.is_empty() {
            Ok(format!("Command executed: {application}"))
        } else {
            Ok(format!(
                "Command output:\n{}",
                truncate_output(&text, self.launch.max_output_chars)
            ))
        }
    }
}
