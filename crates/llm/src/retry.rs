//! Retry logic with capped exponential backoff for LLM calls.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Initial delay (base for exponential backoff) in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Add jitter to prevent synchronized retries.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay before a given attempt (0-indexed; attempt 0 runs immediately).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }
        let exponential =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        let delay_ms = exponential.min(self.max_delay_ms as f64) as u64;

        if self.jitter {
            let jitter_range = delay_ms / 4;
            if jitter_range > 0 {
                let nanos = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos() as u64;
                let jitter = nanos % (jitter_range * 2);
                return Duration::from_millis(delay_ms.saturating_sub(jitter_range) + jitter);
            }
        }
        Duration::from_millis(delay_ms)
    }
}

/// Execute an async operation with retry, stopping early on non-retryable
/// errors. The predicate decides whether a given error is worth another
/// attempt.
pub async fn execute_with_retry_async<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    mut retryable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let mut last_error = None;
    for attempt in 0..=config.max_retries {
        let delay = config.calculate_delay(attempt);
        if delay > Duration::from_millis(0) {
            sleep(delay).await;
        }
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !retryable(&err) || attempt == config.max_retries {
                    return Err(err);
                }
                last_error = Some(err);
            }
        }
    }
    // Unreachable in practice: the loop either returns a value or the final
    // error above. Kept for totality.
    Err(last_error.expect("retry loop exited without result"))
}

/// Classify an error message as retryable based on common transport and HTTP
/// status signatures. 4xx client errors are not retryable; 5xx and 429 are.
pub fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("connection")
        || error_lower.contains("reset")
        || error_lower.contains("refused")
        || error_lower.contains("dns")
        || error_lower.contains("unreachable")
    {
        return true;
    }

    if error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("504")
        || error_lower.contains("429")
        || error_lower.contains("500")
    {
        return true;
    }

    if error_lower.contains("400")
        || error_lower.contains("401")
        || error_lower.contains("403")
        || error_lower.contains("404")
        || error_lower.contains("422")
    {
        return false;
    }

    // Unknown errors retry; the cap bounds the damage.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_is_exponential_without_jitter() {
        let config = RetryConfig {
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.calculate_delay(0), Duration::from_millis(0));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_respects_cap() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 500,
            backoff_multiplier: 10.0,
            jitter: false,
            ..Default::default()
        };
        assert!(config.calculate_delay(3) <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn eventual_success_after_transient_errors() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            jitter: false,
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);
        let result = execute_with_retry_async(
            &config,
            |_| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("503 service unavailable".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
            |e| is_retryable_error(e),
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1,
            jitter: false,
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);
        let result: Result<(), String> = execute_with_retry_async(
            &config,
            |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("401 unauthorized".to_string()) }
            },
            |e| is_retryable_error(e),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retryable_classification() {
        assert!(is_retryable_error("request timeout"));
        assert!(is_retryable_error("HTTP 503"));
        assert!(is_retryable_error("429 Too Many Requests"));
        assert!(!is_retryable_error("HTTP 400 bad request"));
        assert!(!is_retryable_error("404 not found"));
    }
}
