//! Bounded retry with fixed backoff for store operations.
//!
//! Transient faults are absorbed here; exhausting the budget is promoted to
//! a fatal error carrying the operation name and the originating kind, so a
//! flaky network never degrades silently.

use std::future::Future;
use std::time::Duration;

use resoshare_core::{Error, Result};
use tracing::warn;

/// Explicit retry policy applied at each store call site.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: usize,
    /// Fixed delay between attempts.
    pub backoff: Duration,
    /// Which errors are worth another attempt.
    pub retryable: fn(&Error) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_secs(2),
            retryable: is_transient,
        }
    }
}

/// Transport and service faults are transient; everything else (missing
/// accounts, malformed payloads) cannot be fixed by retrying.
pub fn is_transient(err: &Error) -> bool {
    matches!(err, Error::Store(_))
}

impl RetryPolicy {
    /// A policy that fails fast, for tests and interactive tooling.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
            retryable: is_transient,
        }
    }

    /// Run `call` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut kind = String::new();
        for attempt in 1..=self.max_attempts.max(1) {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if (self.retryable)(&err) => {
                    kind = err.to_string();
                    warn!(
                        "{operation} failed (attempt {attempt}/{}): {err}",
                        self.max_attempts
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::RetriesExhausted {
            operation: operation.to_string(),
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_success_needs_one_attempt() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::immediate(5);
        let value = policy
            .run("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::immediate(5);
        let value = policy
            .run("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Store("connection reset".into()))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();
        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_names_the_operation() {
        let policy = RetryPolicy::immediate(3);
        let err = policy
            .run("set cookies", || async {
                Err::<(), _>(Error::Store("timed out".into()))
            })
            .await
            .unwrap_err();
        match err {
            Error::RetriesExhausted { operation, kind } => {
                assert_eq!(operation, "set cookies");
                assert!(kind.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::immediate(5);
        let err = policy
            .run("get cookies", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::InvalidAccount("x".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAccount(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
