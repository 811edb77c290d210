//! Gate every external call passes through.
//!
//! One place enforces, in order: run cancellation, the backend's circuit,
//! the token budget, the shared concurrency limit, the per-call timeout and
//! retry with backoff. Cancellation is checked before every attempt; a
//! call that already holds a permit is allowed to finish.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{backoff, BudgetTracker, CircuitBreaker};
use crate::config::RetryConfig;

/// Errors that may clear up on retry.
pub trait Transient {
    fn is_transient(&self) -> bool;

    /// The error reported when an attempt exceeds the call timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Why a guarded call did not produce a value.
#[derive(Error, Debug, Clone)]
pub enum CallError<E> {
    #[error("run cancelled before the call was issued")]
    Cancelled,

    #[error("circuit open for '{0}'")]
    CircuitOpen(String),

    #[error("token budget exhausted for '{0}'")]
    BudgetExhausted(String),

    #[error(transparent)]
    Backend(E),
}

impl<E: Transient> CallError<E> {
    /// Transient-external class. Refused gates count as transient: the same
    /// item may succeed in a later run.
    pub fn is_transient(&self) -> bool {
        match self {
            CallError::Cancelled => false,
            CallError::CircuitOpen(_) | CallError::BudgetExhausted(_) => true,
            CallError::Backend(e) => e.is_transient(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, CallError::Backend(e) if e.is_transient())
    }
}

/// Shared call gate.
#[derive(Clone)]
pub struct CallGuard {
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    breaker: Arc<CircuitBreaker>,
    budgets: Arc<BudgetTracker>,
    retry: RetryConfig,
    timeout: Duration,
    issued: Arc<AtomicUsize>,
}

impl CallGuard {
    pub fn new(
        max_external_calls: usize,
        cancel: CancellationToken,
        breaker: Arc<CircuitBreaker>,
        budgets: Arc<BudgetTracker>,
        retry: RetryConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_external_calls.max(1))),
            cancel,
            breaker,
            budgets,
            retry,
            timeout,
            issued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The same gate observing a different cancellation token.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn budgets(&self) -> &BudgetTracker {
        &self.budgets
    }

    /// Attempts that reached a backend so far.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Run `op` under the gate, retrying transient failures.
    pub async fn call<T, E, F, Fut>(&self, scope: &str, op: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::error::Error + 'static,
    {
        let mut op = op;
        let attempts = AtomicUsize::new(0);
        let attempt = || {
            let fut = op();
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { self.attempt(scope, n, fut).await }
        };

        attempt
            .retry(backoff(&self.retry))
            .sleep(tokio::time::sleep)
            .when(|e: &CallError<E>| e.is_retryable())
            .notify(|e: &CallError<E>, delay: Duration| {
                tracing::warn!(scope, error = %e, delay = ?delay, "Retrying external call");
            })
            .await
    }

    /// Like [`CallGuard::call`], refusing up front when `scope` cannot
    /// afford `estimated_tokens`.
    pub async fn call_metered<T, E, F, Fut>(
        &self,
        scope: &str,
        estimated_tokens: u32,
        op: F,
    ) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::error::Error + 'static,
    {
        if !self.budgets.can_afford(scope, estimated_tokens) {
            tracing::warn!(scope, estimated_tokens, "Token budget exhausted");
            return Err(CallError::BudgetExhausted(scope.to_string()));
        }
        self.call(scope, op).await
    }

    async fn attempt<T, E, Fut>(
        &self,
        scope: &str,
        attempt: usize,
        fut: Fut,
    ) -> Result<T, CallError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Transient,
    {
        if self.cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }
        if self.breaker.is_open(scope) {
            return Err(CallError::CircuitOpen(scope.to_string()));
        }

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(CallError::Cancelled),
            permit = self.semaphore.acquire() => permit.map_err(|_| CallError::Cancelled)?,
        };

        self.issued.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(scope, attempt, "Issuing external call");

        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => {
                self.breaker.record_success(scope);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.breaker.record_failure(scope);
                Err(CallError::Backend(e))
            }
            Err(_) => {
                self.breaker.record_failure(scope);
                Err(CallError::Backend(E::timed_out(self.timeout)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerConfig;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Flaky,
        Fatal,
        Timeout,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl std::error::Error for FakeError {}

    impl Transient for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, FakeError::Flaky | FakeError::Timeout)
        }

        fn timed_out(_after: Duration) -> Self {
            FakeError::Timeout
        }
    }

    fn guard(max_retries: usize) -> CallGuard {
        CallGuard::new(
            2,
            CancellationToken::new(),
            Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 100,
                ..Default::default()
            })),
            Arc::new(BudgetTracker::new(1000, 100, ["m"])),
            RetryConfig {
                max_retries,
                min_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
            },
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let guard = guard(3);
        let calls = AtomicUsize::new(0);
        let result: Result<&str, CallError<FakeError>> = guard
            .call("m", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FakeError::Flaky)
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(guard.issued(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_bounded() {
        let guard = guard(2);
        let calls = AtomicUsize::new(0);
        let result: Result<(), CallError<FakeError>> = guard
            .call("m", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Flaky)
            })
            .await;
        assert!(matches!(result, Err(CallError::Backend(FakeError::Flaky))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_not_retried() {
        let guard = guard(3);
        let calls = AtomicUsize::new(0);
        let result: Result<(), CallError<FakeError>> = guard
            .call("m", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Fatal)
            })
            .await;
        assert!(matches!(result, Err(CallError::Backend(FakeError::Fatal))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_transient_error() {
        let guard = guard(0);
        let result: Result<(), CallError<FakeError>> = guard
            .call("m", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(CallError::Backend(FakeError::Timeout))));
    }

    #[tokio::test]
    async fn test_cancelled_guard_issues_nothing() {
        let guard = guard(3);
        guard.cancel_token().cancel();
        let result: Result<(), CallError<FakeError>> =
            guard.call("m", || async { Ok(()) }).await;
        assert!(matches!(result, Err(CallError::Cancelled)));
        assert_eq!(guard.issued(), 0);
    }

    #[tokio::test]
    async fn test_budget_refused_without_calling() {
        let guard = guard(3);
        let result: Result<(), CallError<FakeError>> =
            guard.call_metered("m", 101, || async { Ok(()) }).await;
        assert!(matches!(result, Err(CallError::BudgetExhausted(_))));
        assert!(result.unwrap_err().is_transient());
        assert_eq!(guard.issued(), 0);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }));
        breaker.record_failure("m");
        let guard = CallGuard::new(
            1,
            CancellationToken::new(),
            breaker,
            Arc::new(BudgetTracker::new(1000, 1000, ["m"])),
            RetryConfig::default(),
            Duration::from_secs(1),
        );
        let result: Result<(), CallError<FakeError>> =
            guard.call("m", || async { Ok(()) }).await;
        assert!(matches!(result, Err(CallError::CircuitOpen(_))));
        assert_eq!(guard.issued(), 0);
    }
}
