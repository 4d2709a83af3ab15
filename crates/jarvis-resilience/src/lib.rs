//! Retry, fallback, health probing and degraded-mode tracking for unreliable services.

pub mod degraded;
pub mod error;
pub mod fallback;
pub mod guard;
pub mod health;
pub mod responder;
pub mod retry;

pub use degraded::{DegradedSnapshot, DegradedState, service};
pub use error::{Classify, FailureKind, ResilienceError, RetryError};
pub use fallback::FallbackChain;
pub use guard::ServiceGuard;
pub use health::{HealthCheck, HealthChecker, HealthReport, HealthResult, Probe};
pub use responder::{OfflineConfig, OfflineResponder, Reply, ReplySource};
pub use retry::{Operation, RetryConfig, RetryPolicy, operation};
