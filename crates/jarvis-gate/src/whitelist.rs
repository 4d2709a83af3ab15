use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

type Entries = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, thiserror::Error)]
pub enum WhitelistError {
    #[error("whitelist I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize whitelist: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whitelist category. The three built-in categories always exist; callers may add more.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    FileOperations,
    Applications,
    WebUrls,
    Custom(String),
}

impl Category {
    pub const DEFAULTS: [Category; 3] = [
        Category::Applications,
        Category::FileOperations,
        Category::WebUrls,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::FileOperations => "file_operations",
            Self::Applications => "applications",
            Self::WebUrls => "web_urls",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.as_str() {
            "file_operations" => Self::FileOperations,
            "applications" => Self::Applications,
            "web_urls" => Self::WebUrls,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        match value {
            Category::Custom(name) => name,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category → set-of-keys allow-list with write-through JSON persistence.
///
/// Every mutation rewrites the whole file through a sibling temp file and a rename, so a
/// crash mid-write never leaves a truncated whitelist behind.
#[derive(Debug)]
pub struct WhitelistStore {
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
}

fn default_entries() -> Entries {
    Category::DEFAULTS
        .iter()
        .map(|c| (c.as_str().to_owned(), BTreeSet::new()))
        .collect()
}

impl WhitelistStore {
    /// Load the whitelist from `path`.
    ///
    /// A missing file yields the default categories. A corrupt or unreadable file is logged
    /// and replaced in memory by the defaults; the file itself is left untouched until the
    /// next mutation.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, Vec<String>>>(&raw) {
                Ok(map) => {
                    let mut entries = default_entries();
                    for (category, keys) in map {
                        entries.entry(category).or_default().extend(keys);
                    }
                    tracing::debug!(path = %path.display(), "whitelist loaded");
                    entries
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), "corrupt whitelist, using defaults: {e}");
                    default_entries()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => default_entries(),
            Err(e) => {
                tracing::error!(path = %path.display(), "failed to read whitelist, using defaults: {e}");
                default_entries()
            }
        };

        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// Store without a backing file. Mutations only live for the process lifetime.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(default_entries()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_member(&self, category: &Category, key: &str) -> bool {
        self.lock()
            .get(category.as_str())
            .is_some_and(|keys| keys.contains(key))
    }

    /// Add `key` to `category` and persist. Adding an existing key is a no-op for the set but
    /// still rewrites the file. A failed write leaves the in-memory set unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the whitelist file cannot be written.
    pub fn add(&self, category: &Category, key: &str) -> Result<(), WhitelistError> {
        let mut entries = self.lock();
        let had_category = entries.contains_key(category.as_str());
        let inserted = entries
            .entry(category.as_str().to_owned())
            .or_default()
            .insert(key.to_owned());
        if let Err(e) = self.persist(&entries) {
            if inserted {
                if had_category {
                    if let Some(keys) = entries.get_mut(category.as_str()) {
                        keys.remove(key);
                    }
                } else {
                    entries.remove(category.as_str());
                }
            }
            return Err(e);
        }
        if inserted {
            tracing::info!(category = %category, key, "added to whitelist");
        }
        Ok(())
    }

    /// Remove `key` from `category` and persist. Returns whether the key was present.
    /// A failed write leaves the in-memory set unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the whitelist file cannot be written.
    pub fn remove(&self, category: &Category, key: &str) -> Result<bool, WhitelistError> {
        let mut entries = self.lock();
        let removed = entries
            .get_mut(category.as_str())
            .is_some_and(|keys| keys.remove(key));
        if let Err(e) = self.persist(&entries) {
            if removed && let Some(keys) = entries.get_mut(category.as_str()) {
                keys.insert(key.to_owned());
            }
            return Err(e);
        }
        if removed {
            tracing::info!(category = %category, key, "removed from whitelist");
        }
        Ok(removed)
    }

    /// Sorted keys of `category`; empty for an unknown category.
    #[must_use]
    pub fn all(&self, category: &Category) -> Vec<String> {
        self.lock()
            .get(category.as_str())
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        self.lock().keys().cloned().map(Category::from).collect()
    }

    fn persist(&self, entries: &Entries) -> Result<(), WhitelistError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| WhitelistError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}
