//! Side-effect-free dependency probes.
//!
//! A probe never fails: any internal error reads as "unhealthy".

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::degraded::DegradedState;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_AUDIO_DEVICE_GLOB: &str = "/dev/snd/pcmC*D*c";

/// What to check for a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum Probe {
    /// `GET {base_url}/api/tags` answers with a 2xx.
    LlmBackend { base_url: String },
    /// At least one audio capture device node exists.
    AudioInput,
    /// A regular file exists, e.g. a TTS binary or model.
    File { path: PathBuf },
    /// An executable is resolvable on `PATH`.
    Command { name: String },
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LlmBackend { base_url } => write!(f, "llm backend at {base_url}"),
            Self::AudioInput => f.write_str("audio input device"),
            Self::File { path } => write!(f, "file {}", path.display()),
            Self::Command { name } => write!(f, "command `{name}`"),
        }
    }
}

/// A probe bound to the service it vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub service: String,
    #[serde(flatten)]
    pub probe: Probe,
}

impl HealthCheck {
    #[must_use]
    pub fn new(service: impl Into<String>, probe: Probe) -> Self {
        Self {
            service: service.into(),
            probe,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResult {
    pub service: String,
    pub probe: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub results: Vec<HealthResult>,
}

impl HealthReport {
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.results.iter().filter(|r| r.healthy).count()
    }

    #[must_use]
    pub fn all_healthy(&self) -> bool {
        self.results.iter().all(|r| r.healthy)
    }

    #[must_use]
    pub fn unhealthy_services(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.healthy)
            .map(|r| r.service.as_str())
            .collect()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            let mark = if r.healthy { "ok  " } else { "FAIL" };
            writeln!(f, "[{mark}] {:<6} {}", r.service, r.probe)?;
        }
        write!(
            f,
            "{}/{} services healthy",
            self.healthy_count(),
            self.results.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
    audio_device_glob: String,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl HealthChecker {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            audio_device_glob: DEFAULT_AUDIO_DEVICE_GLOB.to_owned(),
        }
    }

    #[must_use]
    pub fn with_audio_device_glob(mut self, pattern: impl Into<String>) -> Self {
        self.audio_device_glob = pattern.into();
        self
    }

    pub async fn check_llm(&self, base_url: &str) -> bool {
        let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(url, "llm health probe failed: {e}");
                false
            }
        }
    }

    #[must_use]
    pub fn check_audio_input(&self) -> bool {
        glob::glob(&self.audio_device_glob)
            .map(|mut paths| paths.any(|p| p.is_ok()))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn check_file(path: &Path) -> bool {
        path.is_file()
    }

    #[must_use]
    pub fn check_command(name: &str) -> bool {
        which::which(name).is_ok()
    }

    pub async fn check(&self, probe: &Probe) -> bool {
        match probe {
            Probe::LlmBackend { base_url } => self.check_llm(base_url).await,
            Probe::AudioInput => self.check_audio_input(),
            Probe::File { path } => Self::check_file(path),
            Probe::Command { name } => Self::check_command(name),
        }
    }

    /// Run every check in order and update `state`: failing services are marked degraded,
    /// passing ones recovered.
    pub async fn sweep(&self, checks: &[HealthCheck], state: &DegradedState) -> HealthReport {
        let mut report = HealthReport::default();
        for check in checks {
            let healthy = self.check(&check.probe).await;
            if healthy {
                state.mark_recovered(&check.service);
            } else {
                tracing::warn!(service = %check.service, probe = %check.probe, "health check failed");
                state.mark_degraded(&check.service);
            }
            report.results.push(HealthResult {
                service: check.service.clone(),
                probe: check.probe.to_string(),
                healthy,
            });
        }
        tracing::info!(
            "{}/{} services healthy",
            report.healthy_count(),
            report.results.len()
        );
        report
    }
}
