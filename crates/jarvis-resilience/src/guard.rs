use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::degraded::DegradedState;
use crate::error::{Classify, ResilienceError, RetryError};
use crate::fallback::FallbackChain;
use crate::retry::RetryPolicy;

/// Runs calls into a named service under a retry policy and keeps [`DegradedState`] in sync
/// with the outcome.
#[derive(Debug, Clone)]
pub struct ServiceGuard {
    policy: RetryPolicy,
    state: Arc<DegradedState>,
}

impl ServiceGuard {
    #[must_use]
    pub fn new(policy: RetryPolicy, state: Arc<DegradedState>) -> Self {
        Self { policy, state }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn state(&self) -> &Arc<DegradedState> {
        &self.state
    }

    /// Call `service` through the retry policy.
    ///
    /// Success marks the service recovered; exhausting the retries marks it degraded.
    ///
    /// # Errors
    ///
    /// [`ResilienceError::RetryExhausted`] when every attempt failed, or
    /// [`ResilienceError::Failed`] for a non-retryable error (the service state is left alone).
    pub async fn call<T, E, F, Fut>(&self, service: &str, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        match self.policy.execute(op).await {
            Ok(value) => {
                self.state.mark_recovered(service);
                Ok(value)
            }
            Err(RetryError::Exhausted { attempts, source }) => {
                tracing::error!(service, attempts, "service call exhausted retries: {source}");
                self.state.mark_degraded(service);
                Err(ResilienceError::RetryExhausted {
                    service: service.to_owned(),
                    attempts,
                    source,
                })
            }
            Err(RetryError::Aborted(source)) => Err(ResilienceError::Failed {
                service: service.to_owned(),
                source,
            }),
        }
    }

    /// Run `chain` for `service`. Candidates carry their own retry wrapping.
    ///
    /// # Errors
    ///
    /// [`ResilienceError::AllFallbacksFailed`] with the last candidate's error; the service is
    /// marked degraded.
    pub async fn call_chain<A, T, E>(
        &self,
        service: &str,
        chain: &FallbackChain<A, T, E>,
        args: A,
    ) -> Result<(T, usize), ResilienceError<E>>
    where
        A: Clone,
        E: Display,
    {
        match chain.execute(args).await {
            Ok(found) => {
                self.state.mark_recovered(service);
                Ok(found)
            }
            Err(source) => {
                self.state.mark_degraded(service);
                Err(ResilienceError::AllFallbacksFailed {
                    service: service.to_owned(),
                    candidates: chain.candidate_count(),
                    source,
                })
            }
        }
    }
}
