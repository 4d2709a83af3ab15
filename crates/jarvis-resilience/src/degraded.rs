use std::collections::BTreeSet;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

/// Well-known service names.
pub mod service {
    pub const STT: &str = "stt";
    pub const LLM: &str = "llm";
    pub const TTS: &str = "tts";
    pub const WEB: &str = "web";
    pub const AUDIO: &str = "audio";
}

#[derive(Debug, Default)]
struct Inner {
    degraded: BTreeSet<String>,
    offline: bool,
}

/// Process-wide record of unhealthy services and the offline flag.
///
/// Construct once and share through `Arc`.
#[derive(Debug, Default)]
pub struct DegradedState {
    inner: RwLock<Inner>,
}

/// Point-in-time copy of [`DegradedState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedSnapshot {
    pub degraded: Vec<String>,
    pub offline: bool,
}

impl fmt::Display for DegradedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.degraded.is_empty() {
            f.write_str("all services healthy")?;
        } else {
            write!(f, "degraded: {}", self.degraded.join(", "))?;
        }
        if self.offline {
            f.write_str(" (offline)")?;
        }
        Ok(())
    }
}

impl DegradedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` when the service was healthy before this call.
    pub fn mark_degraded(&self, service: &str) -> bool {
        let changed = self.write().degraded.insert(service.to_owned());
        if changed {
            tracing::warn!(service, "service marked as degraded");
        }
        changed
    }

    /// Returns `true` when the service was degraded before this call.
    pub fn mark_recovered(&self, service: &str) -> bool {
        let changed = self.write().degraded.remove(service);
        if changed {
            tracing::info!(service, "service recovered");
        }
        changed
    }

    #[must_use]
    pub fn is_degraded(&self, service: &str) -> bool {
        self.read().degraded.contains(service)
    }

    #[must_use]
    pub fn list_degraded(&self) -> Vec<String> {
        self.read().degraded.iter().cloned().collect()
    }

    pub fn enable_offline(&self) {
        let mut inner = self.write();
        if !inner.offline {
            inner.offline = true;
            tracing::warn!("offline mode enabled");
        }
    }

    pub fn disable_offline(&self) {
        let mut inner = self.write();
        if inner.offline {
            inner.offline = false;
            tracing::info!("offline mode disabled");
        }
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.read().offline
    }

    #[must_use]
    pub fn snapshot(&self) -> DegradedSnapshot {
        let inner = self.read();
        DegradedSnapshot {
            degraded: inner.degraded.iter().cloned().collect(),
            offline: inner.offline,
        }
    }
}
