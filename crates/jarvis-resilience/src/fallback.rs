use std::fmt::{self, Display};

use crate::retry::Operation;

/// Ordered alternatives for one logical operation, tried until one succeeds.
///
/// The primary always exists, so a chain is never empty.
pub struct FallbackChain<A, T, E> {
    primary: (String, Operation<A, T, E>),
    fallbacks: Vec<(String, Operation<A, T, E>)>,
}

impl<A, T, E> fmt::Debug for FallbackChain<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackChain")
            .field("candidates", &self.names())
            .finish()
    }
}

impl<A, T, E> FallbackChain<A, T, E> {
    #[must_use]
    pub fn new(name: impl Into<String>, primary: Operation<A, T, E>) -> Self {
        Self {
            primary: (name.into(), primary),
            fallbacks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, name: impl Into<String>, op: Operation<A, T, E>) -> Self {
        self.fallbacks.push((name.into(), op));
        self
    }

    /// Number of candidates including the primary.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.fallbacks.len() + 1
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        std::iter::once(self.primary.0.as_str())
            .chain(self.fallbacks.iter().map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Try each candidate in declaration order with a clone of `args`.
    ///
    /// Returns the first success together with the index of the candidate that produced it
    /// (0 for the primary).
    ///
    /// # Errors
    ///
    /// Returns the last candidate's error unchanged when every candidate fails.
    pub async fn execute(&self, args: A) -> Result<(T, usize), E>
    where
        A: Clone,
        E: Display,
    {
        let (name, primary) = &self.primary;
        tracing::debug!(candidate = %name, "trying primary");
        let mut result = primary(args.clone()).await;
        let mut index = 0;

        for (i, (name, op)) in self.fallbacks.iter().enumerate() {
            let e = match result {
                Ok(value) => return Ok((value, index)),
                Err(e) => e,
            };
            let failed = self.label(index);
            index = i + 1;
            tracing::warn!(candidate = %name, "{failed} failed, trying fallback {index}: {e}");
            result = op(args.clone()).await;
        }

        match result {
            Ok(value) => {
                if index > 0 {
                    tracing::info!(index, "fallback {index} succeeded");
                }
                Ok((value, index))
            }
            Err(e) => {
                tracing::error!(
                    candidates = self.candidate_count(),
                    "all fallback candidates failed: {e}"
                );
                Err(e)
            }
        }
    }

    /// [`execute`](Self::execute) without the candidate index.
    ///
    /// # Errors
    ///
    /// Returns the last candidate's error when every candidate fails.
    pub async fn call(&self, args: A) -> Result<T, E>
    where
        A: Clone,
        E: Display,
    {
        self.execute(args).await.map(|(value, _)| value)
    }

    fn label(&self, index: usize) -> String {
        let name = if index == 0 {
            &self.primary.0
        } else {
            &self.fallbacks[index - 1].0
        };
        if index == 0 {
            format!("primary ({name})")
        } else {
            format!("fallback {index} ({name})")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::{Classify, FailureKind, RetryError};
    use crate::retry::{RetryPolicy, operation};

    fn counted(
        calls: &Arc<AtomicU32>,
        result: Result<&'static str, &'static str>,
    ) -> Operation<(), &'static str, String> {
        let calls = Arc::clone(calls);
        operation(move |()| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { result.map_err(str::to_owned) }
        })
    }

    #[tokio::test]
    async fn first_failure_then_success_returns_index_one() {
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));
        let chain = FallbackChain::new("primary", counted(&a, Err("down")))
            .with_fallback("backup", counted(&b, Ok("ok")));

        assert_eq!(chain.execute(()).await.unwrap(), ("ok", 1));
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn primary_success_short_circuits() {
        let a = Arc::new(AtomicU32::new(0));
        let b = Arc::new(AtomicU32::new(0));
        let chain = FallbackChain::new("primary", counted(&a, Ok("fast")))
            .with_fallback("backup", counted(&b, Ok("slow")));

        assert_eq!(chain.execute(()).await.unwrap(), ("fast", 0));
        assert_eq!(b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failing_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let chain = FallbackChain::new("a", counted(&calls, Err("first")))
            .with_fallback("b", counted(&calls, Err("second")))
            .with_fallback("c", counted(&calls, Err("third")));

        assert_eq!(chain.execute(()).await.unwrap_err(), "third");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(chain.names(), vec!["a", "b", "c"]);
        assert_eq!(chain.candidate_count(), 3);
    }

    #[tokio::test]
    async fn single_candidate_chain() {
        let calls = Arc::new(AtomicU32::new(0));
        let chain = FallbackChain::new("only", counted(&calls, Err("nope")));
        assert_eq!(chain.call(()).await.unwrap_err(), "nope");
    }

    #[derive(Debug)]
    struct Down;

    impl Display for Down {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("down")
        }
    }

    impl Classify for Down {
        fn failure_kind(&self) -> FailureKind {
            FailureKind::Connect
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_wrapped_candidates_compose() {
        let primary_calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&primary_calls);
        let primary = operation(move |_prompt: String| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(Down) }
        });
        let backup = operation(|q: String| async move { Ok::<_, Down>(format!("cached:{q}")) });

        let policy = RetryPolicy::new(2).with_initial_delay(Duration::from_millis(10));
        let chain: FallbackChain<String, String, RetryError<Down>> =
            FallbackChain::new("llm", policy.wrap(primary)).with_fallback("cache", policy.wrap(backup));

        let (reply, index) = chain.execute("hi".to_owned()).await.unwrap();
        assert_eq!(reply, "cached:hi");
        assert_eq!(index, 1);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
    }
}
