use std::path::Path;

use jarvis_gate::{Category, ConfirmationRequest};

use crate::executor::{ActionError, ActionExecutor, FileOperation, truncate_output};

impl ActionExecutor {
    /// Run a file operation inside the sandbox.
    ///
    /// Mutations pass through the gate under the key `operation:parent-directory`; deletions are
    /// always prompted.
    ///
    /// # Errors
    ///
    /// [`ActionError::PathDenied`] outside the allowed roots (the gate is never consulted), a
    /// cancellation error when the gate declines, [`ActionError::Failed`] for missing targets or
    /// type mismatches, and I/O errors from the filesystem.
    pub async fn execute_file_operation(
        &self,
        operation: FileOperation,
        raw_path: &str,
        content: Option<&str>,
    ) -> Result<String, ActionError> {
        let Some(target) = self.sandbox.resolve(raw_path) else {
            return Err(ActionError::PathDenied {
                path: raw_path.to_owned(),
            });
        };
        match operation {
            FileOperation::ReadFile => return self.read_file(&target).await,
            FileOperation::ListDirectory => return self.list_directory(&target).await,
            _ => {}
        }

        // Mutations act on the entry the caller named, never on a symlink's target.
        let Some(path) = self.sandbox.resolve_entry(raw_path) else {
            return Err(ActionError::PathDenied {
                path: raw_path.to_owned(),
            });
        };
        let is_link = match operation {
            FileOperation::DeleteFile => expect_kind(&path, false).await?,
            FileOperation::DeleteDirectory => {
                if self.sandbox.is_root(&path) {
                    return Err(ActionError::Blocked(format!(
                        "refusing to delete allowed root {}",
                        path.display()
                    )));
                }
                expect_kind(&path, true).await?
            }
            _ => false,
        };

        let parent = path.parent().unwrap_or(&path);
        self.confirm(
            ConfirmationRequest::new(
                Category::FileOperations,
                format!("{operation} on {}", path.display()),
                format!("{operation}:{}", parent.display()),
            )
            .forced(operation.is_deletion()),
        )
        .await?;

        let shown = path.display();
        match operation {
            FileOperation::CreateFile => {
                if let Some(dir) = path.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
                tokio::fs::write(&path, content.unwrap_or_default()).await?;
                tracing::info!(path = %shown, "file created");
                Ok(format!("File created: {shown}"))
            }
            FileOperation::DeleteFile => {
                tokio::fs::remove_file(&path).await?;
                tracing::info!(path = %shown, "file deleted");
                Ok(format!("File deleted: {shown}"))
            }
            FileOperation::CreateDirectory => {
                tokio::fs::create_dir_all(&path).await?;
                tracing::info!(path = %shown, "directory created");
                Ok(format!("Directory created: {shown}"))
            }
            FileOperation::DeleteDirectory => {
                if is_link {
                    tokio::fs::remove_file(&path).await?;
                } else {
                    tokio::fs::remove_dir_all(&path).await?;
                }
                tracing::info!(path = %shown, "directory deleted");
                Ok(format!("Directory deleted: {shown}"))
            }
            FileOperation::ReadFile | FileOperation::ListDirectory => Err(ActionError::InvalidParams(
                format!("{operation} does not modify the filesystem"),
            )),
        }
    }

    async fn read_file(&self, path: &Path) -> Result<String, ActionError> {
        expect_kind(path, false).await?;
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(format!(
            "File content:\n{}",
            truncate_output(&text, self.file.max_read_chars)
        ))
    }

    async fn list_directory(&self, path: &Path) -> Result<String, ActionError> {
        expect_kind(path, true).await?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }
        dirs.sort();
        files.sort();

        let total = dirs.len() + files.len();
        let mut out = format!("Contents of {}:", path.display());
        if total == 0 {
            out.push_str("\n(empty)");
        }
        let lines = dirs
            .iter()
            .map(|d| format!("📁 {d}"))
            .chain(files.iter().map(|f| format!("📄 {f}")))
            .take(self.file.max_list_entries);
        for line in lines {
            out.push('\n');
            out.push_str(&line);
        }
        if total > self.file.max_list_entries {
            out.push_str("\n... (truncated)");
        }
        Ok(out)
    }
}

/// Check `path` exists and is a directory (`want_dir`) or a regular file, following a trailing
/// symlink for the type check. Returns whether `path` itself is a symlink.
async fn expect_kind(path: &Path, want_dir: bool) -> Result<bool, ActionError> {
    let what = if want_dir { "Directory" } else { "File" };
    let not_found = || ActionError::Failed(format!("{what} not found: {}", path.display()));
    let entry = tokio::fs::symlink_metadata(path)
        .await
        .map_err(|_| not_found())?;
    let is_link = entry.file_type().is_symlink();
    let is_dir = if is_link {
        tokio::fs::metadata(path).await.map_err(|_| not_found())?.is_dir()
    } else {
        entry.is_dir()
    };
    match (want_dir, is_dir) {
        (true, false) => Err(ActionError::Failed(format!(
            "Not a directory: {}",
            path.display()
        ))),
        (false, true) => Err(ActionError::Failed(format!(
            "Not a file: {}",
            path.display()
        ))),
        _ => Ok(is_link),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jarvis_gate::{
        ConfirmationDecision, ConfirmationGate, ScriptedConfirmation, WhitelistStore,
    };
    use jarvis_resilience::DegradedState;

    use super::*;
    use crate::config::ToolsConfig;

    fn executor(root: &Path, handler: Arc<ScriptedConfirmation>) -> ActionExecutor {
        let config = ToolsConfig {
            allowed_directories: vec![root.display().to_string()],
            ..ToolsConfig::default()
        };
        let gate = ConfirmationGate::new(Arc::new(WhitelistStore::in_memory())).with_handler(handler);
        ActionExecutor::new(&config, Arc::new(gate), Arc::new(DegradedState::new()))
    }

    #[tokio::test]
    async fn outside_root_is_denied_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        let err = exec
            .execute_file_operation(FileOperation::DeleteFile, "/etc/passwd", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::PathDenied { ref path } if path == "/etc/passwd"));
        assert_eq!(handler.prompt_count(), 0);
    }

    #[tokio::test]
    async fn create_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        let target = dir.path().join("notes/today.txt");
        let raw = target.display().to_string();

        let out = exec
            .execute_file_operation(FileOperation::CreateFile, &raw, Some("buy milk"))
            .await
            .unwrap();
        assert!(out.starts_with("File created: "));

        let out = exec
            .execute_file_operation(FileOperation::ReadFile, &raw, None)
            .await
            .unwrap();
        assert_eq!(out, "File content:\nbuy milk");
        assert_eq!(handler.prompt_count(), 1);

        let (description, key) = handler.prompts().remove(0);
        assert!(description.starts_with("create_file on "));
        assert!(key.starts_with("create_file:"));
        assert!(key.ends_with("notes"));
    }

    #[tokio::test]
    async fn remembered_creation_is_cached_per_directory() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::REMEMBER]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        for name in ["a.txt", "b.txt"] {
            let raw = dir.path().join(name).display().to_string();
            exec.execute_file_operation(FileOperation::CreateFile, &raw, None)
                .await
                .unwrap();
        }
        assert_eq!(handler.prompt_count(), 1);
    }

    #[tokio::test]
    async fn deletion_is_always_prompted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x.txt");
        std::fs::write(&target, "x").unwrap();
        let raw = target.display().to_string();

        let handler = Arc::new(ScriptedConfirmation::new([
            ConfirmationDecision::REMEMBER,
            ConfirmationDecision::DENY,
        ]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        // Both deletions share the remembered `delete_file:<dir>` key.
        let other = dir.path().join("y.txt");
        std::fs::write(&other, "y").unwrap();
        exec.execute_file_operation(FileOperation::DeleteFile, &other.display().to_string(), None)
            .await
            .unwrap();

        let err = exec
            .execute_file_operation(FileOperation::DeleteFile, &raw, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::UserCancelled { .. }));
        assert_eq!(handler.prompt_count(), 2);
        assert!(target.exists());
        assert!(!other.exists());
    }

    #[tokio::test]
    async fn missing_file_fails_before_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        let raw = dir.path().join("ghost.txt").display().to_string();
        let err = exec
            .execute_file_operation(FileOperation::DeleteFile, &raw, None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("File not found: "));
        assert_eq!(handler.prompt_count(), 0);
    }

    #[tokio::test]
    async fn type_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let exec = executor(dir.path(), Arc::new(ScriptedConfirmation::default()));
        let raw = dir.path().join("sub").display().to_string();
        let err = exec
            .execute_file_operation(FileOperation::ReadFile, &raw, None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Not a file: "));
    }

    #[tokio::test]
    async fn directory_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(ScriptedConfirmation::new([
            ConfirmationDecision::ONCE,
            ConfirmationDecision::ONCE,
        ]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        let sub = dir.path().join("projects");
        let raw = sub.display().to_string();

        let out = exec
            .execute_file_operation(FileOperation::CreateDirectory, &raw, None)
            .await
            .unwrap();
        assert!(out.starts_with("Directory created: "));
        std::fs::write(sub.join("readme.md"), "hi").unwrap();

        let out = exec
            .execute_file_operation(FileOperation::DeleteDirectory, &raw, None)
            .await
            .unwrap();
        assert!(out.starts_with("Directory deleted: "));
        assert!(!sub.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn deleting_file_symlink_removes_only_the_link() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.txt");
        let link = dir.path().join("link.txt");
        std::fs::write(&real, "keep me").unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        let out = exec
            .execute_file_operation(FileOperation::DeleteFile, &link.display().to_string(), None)
            .await
            .unwrap();

        assert!(out.starts_with("File deleted: "));
        assert!(out.ends_with("link.txt"));
        assert!(handler.prompts()[0].0.ends_with("link.txt"));
        assert!(link.symlink_metadata().is_err());
        assert_eq!(std::fs::read_to_string(&real).unwrap(), "keep me");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn deleting_directory_symlink_keeps_the_target_tree() {
        let dir = tempfile::tempdir().unwrap();
        let photos = dir.path().join("photos");
        let link = dir.path().join("photos-link");
        std::fs::create_dir(&photos).unwrap();
        std::fs::write(photos.join("a.jpg"), "jpg").unwrap();
        std::os::unix::fs::symlink(&photos, &link).unwrap();

        let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        let out = exec
            .execute_file_operation(
                FileOperation::DeleteDirectory,
                &link.display().to_string(),
                None,
            )
            .await
            .unwrap();

        assert!(out.ends_with("photos-link"), "{out}");
        assert!(link.symlink_metadata().is_err());
        assert!(photos.join("a.jpg").exists());
    }

    #[tokio::test]
    async fn deleting_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(ScriptedConfirmation::new([ConfirmationDecision::ONCE]));
        let exec = executor(dir.path(), Arc::clone(&handler));
        let err = exec
            .execute_file_operation(
                FileOperation::DeleteDirectory,
                &dir.path().display().to_string(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Blocked(_)));
        assert_eq!(handler.prompt_count(), 0);
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn listing_puts_directories_first_and_caps_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zdir")).unwrap();
        for name in ["b.txt", "a.txt", "c.txt"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let mut exec = executor(dir.path(), Arc::new(ScriptedConfirmation::default()));
        let raw = dir.path().display().to_string();

        let out = exec
            .execute_file_operation(FileOperation::ListDirectory, &raw, None)
            .await
            .unwrap();
        let lines: Vec<&str> = out.lines().skip(1).collect();
        assert_eq!(lines, vec!["📁 zdir", "📄 a.txt", "📄 b.txt", "📄 c.txt"]);

        exec.file.max_list_entries = 2;
        let out = exec
            .execute_file_operation(FileOperation::ListDirectory, &raw, None)
            .await
            .unwrap();
        assert!(out.ends_with("📄 a.txt\n... (truncated)"));
    }

    #[tokio::test]
    async fn read_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("big.txt");
        std::fs::write(&target, "x".repeat(20)).unwrap();
        let mut exec = executor(dir.path(), Arc::new(ScriptedConfirmation::default()));
        exec.file.max_read_chars = 5;
        let out = exec
            .execute_file_operation(FileOperation::ReadFile, &target.display().to_string(), None)
            .await
            .unwrap();
        assert_eq!(out, "File content:\nxxxxx\n... (truncated)");
    }

    #[tokio::test]
    async fn headless_gate_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            allowed_directories: vec![dir.path().display().to_string()],
            ..ToolsConfig::default()
        };
        let gate = ConfirmationGate::new(Arc::new(WhitelistStore::in_memory()));
        let exec = ActionExecutor::new(&config, Arc::new(gate), Arc::new(DegradedState::new()));
        let raw = dir.path().join("a.txt").display().to_string();
        let err = exec
            .execute_file_operation(FileOperation::CreateFile, &raw, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NoHandlerConfigured { .. }));
        assert!(!dir.path().join("a.txt").exists());
    }
}
