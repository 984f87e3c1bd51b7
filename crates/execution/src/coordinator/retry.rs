//! Bounded exponential retry for idempotent exchange reads.

use crate::config::RetryConfig;
use crate::exchange::ExchangeError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries `op` on retryable errors up to `policy.max_retries` times.
///
/// Waits `policy.delay_for(attempt)` between attempts, or longer when the
/// exchange asked for it. Order placement never goes through here.
///
/// # Errors
/// Returns the first terminal error, or the last error once retries run out.
pub async fn with_retry<T, F, Fut>(policy: &RetryConfig, label: &str, mut op: F) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let mut delay = policy.delay_for(attempt);
                if let ExchangeError::RateLimited {
                    retry_after_ms: Some(ms),
                } = e
                {
                    delay = delay.max(Duration::from_millis(ms));
                }
                warn!(call = label, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "Retrying exchange call");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&policy(), "ticker", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ExchangeError::Network("reset".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(), "ticker", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExchangeError::Timeout(5))
        })
        .await;
        assert_eq!(result, Err(ExchangeError::Timeout(5)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&policy(), "rules", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExchangeError::InvalidRequest("unknown symbol".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
