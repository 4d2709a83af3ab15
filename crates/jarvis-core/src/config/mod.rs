mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings the runtime cannot honour.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, retry) in [("llm", &self.retry.llm), ("web", &self.retry.web)] {
            if retry.max_attempts == 0 {
                bail!("retry.{name}.max_attempts must be at least 1");
            }
            if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
                bail!(
                    "retry.{name}.backoff_factor must be >= 1.0, got {}",
                    retry.backoff_factor
                );
            }
            if retry.max_delay_ms < retry.initial_delay_ms {
                bail!("retry.{name}.max_delay_ms must not be below initial_delay_ms");
            }
        }
        if self.tools.allowed_directories.is_empty() {
            bail!("tools.allowed_directories must name at least one directory");
        }
        if self.tools.launch.timeout == 0 {
            bail!("tools.launch.timeout must be at least 1 second");
        }
        if self.llm.base_url.trim().is_empty() {
            bail!("llm.base_url must not be empty");
        }
        if self.offline.enabled && self.offline.cache_size == 0 {
            tracing::warn!("offline.cache_size is 0, replies will never be cached");
        }
        Ok(())
    }
}

/// Priority: `--config` flag > `JARVIS_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("JARVIS_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
