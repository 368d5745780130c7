//! Collaborator call controls: timeout, retry with exponential backoff,
//! cancellation.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{CollaboratorError, CollaboratorResult, Result, ScoreloopError};
use crate::obs;

/// Retry policy applied to every collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum wall-clock time for a single attempt (milliseconds, 0 = none).
    pub timeout_ms: u64,
    /// Maximum number of retries (0 = no retries, run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
    /// Cap on a single backoff delay (milliseconds).
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 30 * 60 * 1000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Run once, no timeout, no delay.
    pub fn none() -> Self {
        Self {
            timeout_ms: 0,
            max_retries: 0,
            backoff_base_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Fail with [`ScoreloopError::Cancelled`] once `cancel` has fired.
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ScoreloopError::Cancelled);
    }
    Ok(())
}

/// Call a collaborator under `policy`.
///
/// Retryable errors (transient failures, timeouts) back off and try again;
/// a rejection is returned immediately. Exhausting the retries yields
/// [`ScoreloopError::CollaboratorUnavailable`]. Cancellation is checked before
/// every attempt and also interrupts an attempt or a backoff in flight.
pub async fn call_with_retry<T, F, Fut>(
    collaborator: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CollaboratorResult<T>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        ensure_active(cancel)?;

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ScoreloopError::Cancelled),
            outcome = attempt_once(policy, call()) => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => {
                return Err(ScoreloopError::CollaboratorRejected {
                    collaborator: collaborator.to_string(),
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                last_error = err.to_string();
                if attempt == max_attempts {
                    break;
                }
                let delay = policy.backoff_delay(attempt);
                obs::emit_collaborator_retry(collaborator, attempt, delay, &err);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ScoreloopError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    Err(ScoreloopError::CollaboratorUnavailable {
        collaborator: collaborator.to_string(),
        attempts: max_attempts,
        reason: last_error,
    })
}

async fn attempt_once<T, Fut>(policy: &RetryPolicy, fut: Fut) -> CollaboratorResult<T>
where
    Fut: Future<Output = CollaboratorResult<T>>,
{
    if policy.timeout_ms == 0 {
        return fut.await;
    }
    match tokio::time::timeout(Duration::from_millis(policy.timeout_ms), fut).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => Err(CollaboratorError::Timeout {
            limit_ms: policy.timeout_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout_ms: 1_000,
            max_retries,
            backoff_base_ms: 10,
            max_backoff_ms: 40,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = fast_policy(5);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(40));
        assert_eq!(policy.backoff_delay(9), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let value = call_with_retry("simulator", &fast_policy(2), &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CollaboratorError::Transient("connection reset".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_escalate() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = call_with_retry::<(), _, _>("verifier", &fast_policy(2), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CollaboratorError::Transient("503".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ScoreloopError::CollaboratorUnavailable {
                collaborator,
                attempts,
                ..
            } => {
                assert_eq!(collaborator, "verifier");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected CollaboratorUnavailable, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_retryable() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = call_with_retry::<(), _, _>("reasoner", &fast_policy(1), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = call_with_retry::<(), _, _>("mutator", &fast_policy(3), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CollaboratorError::Rejected("patch does not apply".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ScoreloopError::CollaboratorRejected { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = call_with_retry("simulator", &fast_policy(3), &cancel, || async {
            Ok::<_, CollaboratorError>(1)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ScoreloopError::Cancelled));
    }
}
