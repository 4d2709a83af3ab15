use std::path::{Component, Path, PathBuf};

/// Directory allow-list for file operations.
///
/// Candidate paths are resolved through their nearest existing ancestor so symlinks cannot
/// point outside the allowed roots.
#[derive(Debug, Clone)]
pub struct PathSandbox {
    roots: Vec<PathBuf>,
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Canonicalize the longest existing prefix of `path` and re-attach the rest.
///
/// Returns `None` when the unresolved remainder contains `..` or the existing prefix cannot be
/// canonicalized (e.g. a dangling symlink).
fn resolve_via_ancestors(path: &Path) -> Option<PathBuf> {
    let mut existing = path;
    let mut pending = Vec::new();
    while existing.symlink_metadata().is_err() {
        let last = existing.components().next_back()?;
        match last {
            Component::Normal(name) => pending.push(name.to_owned()),
            Component::CurDir => {}
            _ => return None,
        }
        existing = existing.parent()?;
    }
    let mut resolved = existing.canonicalize().ok()?;
    for name in pending.iter().rev() {
        resolved.push(name);
    }
    Some(resolved)
}

fn absolutize(raw: &str) -> PathBuf {
    let expanded = expand_tilde(raw);
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    }
}

impl PathSandbox {
    #[must_use]
    pub fn new<S: AsRef<str>>(roots: &[S]) -> Self {
        let roots = roots
            .iter()
            .map(|r| {
                let p = expand_tilde(r.as_ref().trim());
                p.canonicalize().unwrap_or(p)
            })
            .collect();
        Self { roots }
    }

    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Resolve `raw` (with `~` expansion, relative to the working directory) and check it
    /// falls under an allowed root.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<PathBuf> {
        let resolved = resolve_via_ancestors(&absolutize(raw))?;
        if self.contains(&resolved) {
            Some(resolved)
        } else {
            tracing::warn!(path = raw, resolved = %resolved.display(), "path outside allowed directories");
            None
        }
    }

    /// The filesystem entry `raw` names: the parent is canonicalized and the final component
    /// kept, so a trailing symlink designates the link itself rather than its target.
    ///
    /// Both the fully resolved target and the entry must fall under an allowed root.
    #[must_use]
    pub fn resolve_entry(&self, raw: &str) -> Option<PathBuf> {
        let resolved = self.resolve(raw)?;
        let absolute = absolutize(raw);
        let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
            return Some(resolved);
        };
        let entry = resolve_via_ancestors(parent)?.join(name);
        if self.contains(&entry) {
            Some(entry)
        } else {
            tracing::warn!(path = raw, entry = %entry.display(), "path outside allowed directories");
            None
        }
    }

    fn contains(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    #[must_use]
    pub fn is_root(&self, resolved: &Path) -> bool {
        self.roots.iter().any(|root| root == resolved)
    }
}
