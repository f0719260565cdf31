use crate::VoteError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use votechain_chain::ChainError;
use votechain_store::StoreError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Errors that can tell whether sending the same request again may help.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Retryable for ChainError {
    fn is_transient(&self) -> bool {
        ChainError::is_transient(self)
    }
}

impl Retryable for VoteError {
    fn is_transient(&self) -> bool {
        match self {
            VoteError::StoreOperationFailed(e) => e.is_transient(),
            VoteError::WalletAbsent(_) => true,
            _ => false,
        }
    }
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff before retry number `attempt + 1`, capped at 30 s.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, action: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        action,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{action} failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, StoreError> = fast(3)
            .run("load polls", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(StoreError::Http("connection reset".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.expect("third attempt"), 3);
    }

    #[tokio::test]
    async fn permanent_failures_stop_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), ChainError> = fast(5)
            .run("vote", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::WalletRejected)
            })
            .await;
        assert!(matches!(result, Err(ChainError::WalletRejected)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), VoteError> = fast(2)
            .run("record vote", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(VoteError::StoreOperationFailed(StoreError::Remote {
                    status: 503,
                    message: "unavailable".into(),
                }))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(31), MAX_DELAY);
        assert_eq!(policy.delay_for(40), MAX_DELAY);
    }

    #[tokio::test]
    async fn many_attempts_without_delay_do_not_overflow() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), StoreError> = RetryPolicy::new(40, Duration::ZERO)
            .run("load polls", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Http("connection reset".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 40);
    }

    #[test]
    fn duplicate_votes_are_never_retried() {
        assert!(!VoteError::AlreadyVoted.is_transient());
        assert!(!VoteError::WrongNetwork { expected: 1, actual: 2 }.is_transient());
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
