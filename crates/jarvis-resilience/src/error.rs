use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse failure category used to decide whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connect,
    RateLimited,
    ServerError,
    ClientError,
    Io,
    Other,
}

impl FailureKind {
    /// Kinds that usually clear up on their own.
    pub const TRANSIENT: [FailureKind; 4] = [
        FailureKind::Timeout,
        FailureKind::Connect,
        FailureKind::RateLimited,
        FailureKind::ServerError,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can report their [`FailureKind`].
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

impl Classify for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FailureKind::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe => FailureKind::Connect,
            _ => FailureKind::Io,
        }
    }
}

impl Classify for reqwest::Error {
    fn failure_kind(&self) -> FailureKind {
        if self.is_timeout() {
            return FailureKind::Timeout;
        }
        if self.is_connect() {
            return FailureKind::Connect;
        }
        match self.status() {
            Some(s) if s == reqwest::StatusCode::TOO_MANY_REQUESTS => FailureKind::RateLimited,
            Some(s) if s.is_server_error() => FailureKind::ServerError,
            Some(s) if s.is_client_error() => FailureKind::ClientError,
            _ if self.is_request() => FailureKind::Connect,
            _ => FailureKind::Other,
        }
    }
}

/// Failure of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("retry exhausted after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    /// A non-retryable error stopped the loop early.
    #[error("{0}")]
    Aborted(E),
}

impl<E> RetryError<E> {
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// The last error produced by the operation.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted(source) => source,
        }
    }

    #[must_use]
    pub fn inner(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } | Self::Aborted(source) => source,
        }
    }
}

impl<E: Classify> Classify for RetryError<E> {
    fn failure_kind(&self) -> FailureKind {
        self.inner().failure_kind()
    }
}

/// Failure of a guarded call into a named service.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    #[error("{service}: retry exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        service: String,
        attempts: u32,
        source: E,
    },

    #[error("{service}: all {candidates} candidates failed, last error: {source}")]
    AllFallbacksFailed {
        service: String,
        candidates: usize,
        source: E,
    },

    #[error("{service}: {source}")]
    Failed { service: String, source: E },
}

impl<E> ResilienceError<E> {
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::RetryExhausted { service, .. }
            | Self::AllFallbacksFailed { service, .. }
            | Self::Failed { service, .. } => service,
        }
    }

    /// Whether the service was marked degraded by this failure.
    #[must_use]
    pub fn is_degrading(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::RetryExhausted { source, .. }
            | Self::AllFallbacksFailed { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_classify() {
        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down");
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(timeout.failure_kind(), FailureKind::Timeout);
        assert_eq!(refused.failure_kind(), FailureKind::Connect);
        assert_eq!(missing.failure_kind(), FailureKind::Io);
    }

    #[test]
    fn retry_error_exposes_last_error() {
        let err: RetryError<std::io::Error> = RetryError::Exhausted {
            attempts: 3,
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
        };
        assert!(err.is_exhausted());
        assert_eq!(err.failure_kind(), FailureKind::Timeout);
        assert_eq!(err.to_string(), "retry exhausted after 3 attempts: slow");
        assert_eq!(err.into_inner().to_string(), "slow");
    }

    #[test]
    fn resilience_error_display() {
        let err = ResilienceError::AllFallbacksFailed {
            service: "llm".to_owned(),
            candidates: 2,
            source: std::io::Error::other("boom"),
        };
        assert_eq!(err.service(), "llm");
        assert!(err.is_degrading());
        assert_eq!(
            err.to_string(),
            "llm: all 2 candidates failed, last error: boom"
        );
    }

    #[test]
    fn failure_kind_serde_names() {
        let json = serde_json::to_string(&FailureKind::ServerError).unwrap();
        assert_eq!(json, "\"server_error\"");
        let kind: FailureKind = serde_json::from_str("\"rate_limited\"").unwrap();
        assert_eq!(kind, FailureKind::RateLimited);
        assert_eq!(FailureKind::Io.to_string(), "io");
    }
}
