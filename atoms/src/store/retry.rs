use std::future::Future;
use tokio::time::{sleep, Duration};

use crate::error::{CoreError, StoreError};

pub const MAX_ATTEMPTS: u32 = 5;

/// Errors that may clear up on their own.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Transient for CoreError {
    fn is_transient(&self) -> bool {
        CoreError::is_transient(self)
    }
}

/// Runs an idempotent operation, retrying transient failures with linear
/// backoff (100ms * attempt, at most `MAX_ATTEMPTS` tries).
pub async fn with_retry<T, E, F, Fut>(op_name: &str, mut op: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts: u32 = 0;
    loop {
        attempts += 1;
        match op().await {
            Err(e) if e.is_transient() && attempts < MAX_ATTEMPTS => {
                tracing::warn!("{} failed (attempt {}/{}): {}", op_name, attempts, MAX_ATTEMPTS, e);
                sleep(Duration::from_millis(100 * attempts as u64)).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = &AtomicU32::new(0);
        let result: Result<u32, StoreError> = with_retry("flaky", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(StoreError::Unavailable("throttled".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry("down", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn condition_failures_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry("cas", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::ConditionFailed)
        })
        .await;
        assert_eq!(result, Err(StoreError::ConditionFailed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
