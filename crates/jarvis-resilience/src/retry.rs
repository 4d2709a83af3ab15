use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{Classify, FailureKind, RetryError};

/// Shareable async operation taking `A` and producing `Result<T, E>`.
///
/// This is the unit retry wrappers and fallback chains compose.
pub type Operation<A, T, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// Box an async closure into an [`Operation`].
pub fn operation<A, T, E, F, Fut>(f: F) -> Operation<A, T, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// TOML shape of a retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<FailureKind>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_retry_on() -> Vec<FailureKind> {
    FailureKind::TRANSIENT.to_vec()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            retry_on: default_retry_on(),
        }
    }
}

impl RetryConfig {
    /// Policy used for LLM and web calls: 3 attempts starting at 2 s.
    #[must_use]
    pub fn network() -> Self {
        Self {
            initial_delay_ms: 2000,
            ..Self::default()
        }
    }
}

/// Bounded retries with exponential backoff.
///
/// The delay before retry `n` (1-based) is `initial_delay * backoff_factor^(n-1)`, capped at
/// `max_delay`. No delay follows the final attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
    retry_on: BTreeSet<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_factor: if config.backoff_factor.is_finite() {
                config.backoff_factor.max(1.0)
            } else {
                1.0
            },
            max_delay: Duration::from_millis(config.max_delay_ms),
            retry_on: config.retry_on.iter().copied().collect(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Single attempt, no delays.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn with_retry_on(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.retry_on = kinds.into_iter().collect();
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn retries_on(&self, kind: FailureKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Delay slept before retry number `retry` (1-based).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = self.initial_delay.as_nanos() as f64 * self.backoff_factor.powi(exp);
        let cap = self.max_delay.as_nanos() as f64;
        if !nanos.is_finite() || nanos >= cap {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Full delay schedule: one entry per retry, `max_attempts - 1` entries.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|n| self.delay_for(n)).collect()
    }

    /// Run `op`, retrying failures whose kind is in the policy's retry set.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Exhausted`] with the last failure when every attempt failed, or
    /// [`RetryError::Aborted`] as soon as a failure outside the retry set occurs.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        self.execute_when(op, |e: &E| self.retries_on(e.failure_kind()))
            .await
    }

    /// Like [`execute`](Self::execute) with an ad-hoc retryable predicate.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn execute_when<T, E, F, Fut, P>(
        &self,
        mut op: F,
        mut should_retry: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !should_retry(&e) => return Err(RetryError::Aborted(e)),
                Err(e) if attempt >= self.max_attempts => {
                    tracing::error!(attempts = attempt, "all retry attempts failed: {e}");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "attempt failed, retrying: {e}"
                    );
                    drop(e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Wrap `op` so every call runs under this policy. Arguments and success type are
    /// unchanged, so wrapped operations slot into a [`FallbackChain`](crate::FallbackChain).
    #[must_use]
    pub fn wrap<A, T, E>(&self, op: Operation<A, T, E>) -> Operation<A, T, RetryError<E>>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        E: Classify + Display + Send + 'static,
    {
        let policy = self.clone();
        Arc::new(move |args: A| {
            let policy = policy.clone();
            let op = Arc::clone(&op);
            async move {
                let attempt = move || op(args.clone());
                policy.execute(attempt).await
            }
            .boxed()
        })
    }
}
