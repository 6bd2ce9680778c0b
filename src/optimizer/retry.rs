//! Bounded retry with exponential backoff, driven by `EngineError::is_retryable`.

use crate::error::{EngineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts for backend failures in analysis and encoding
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Attempts for storage reads and writes
    pub storage_attempts: u32,
    /// Attempts for a task that hit its timeout
    pub timeout_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            storage_attempts: 2,
            timeout_attempts: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt with zero-based index `failed_attempt`
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(failed_attempt))
    }

    /// Total attempts allowed for this kind of failure
    pub fn attempts_for(&self, err: &EngineError) -> u32 {
        match err {
            EngineError::Storage(_) => self.storage_attempts,
            EngineError::Timeout(_) => self.timeout_attempts,
            _ => self.max_attempts,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// budget for its error kind is spent. Returns the value and the
    /// number of attempts it took.
    pub async fn run<T, F, Fut>(&self, stage: &str, cancel: &CancellationToken, mut op: F) -> Result<(T, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let outcome = tokio::select! {
                result = op() => result,
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            };
            attempt += 1;

            let err = match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            let budget = self.attempts_for(&err);
            if attempt >= budget {
                return Err(EngineError::service(attempt, err));
            }

            let delay = self.delay_for(attempt - 1);
            warn!(
                stage,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient failure"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(400));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
    }

    #[test]
    fn test_budget_per_error_kind() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts_for(&EngineError::TranscodeBackend("x".into())), 3);
        assert_eq!(policy.attempts_for(&EngineError::Storage("x".into())), 2);
        assert_eq!(policy.attempts_for(&EngineError::Timeout(Duration::from_secs(1))), 2);
    }

    #[tokio::test]
    async fn test_succeeds_after_two_failures() {
        let calls = &AtomicU32::new(0);
        let (value, attempts) = fast()
            .run("encoding", &CancellationToken::new(), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EngineError::TranscodeBackend("flaky".into()))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let calls = &AtomicU32::new(0);
        let err = fast()
            .run::<(), _, _>("encoding", &CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::TranscodeBackend("down".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            EngineError::Service { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, EngineError::TranscodeBackend(_)));
            }
            other => panic!("expected service error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = fast()
            .run::<(), _, _>("encoding", &CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::CorruptInput("bad header".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, EngineError::CorruptInput(_)));
    }

    #[tokio::test]
    async fn test_storage_errors_retry_once() {
        let calls = &AtomicU32::new(0);
        let err = fast()
            .run::<(), _, _>("write", &CancellationToken::new(), || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Storage("503".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.root().kind(), crate::error::ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_loop() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fast()
            .run::<(), _, _>("encoding", &cancel, || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
