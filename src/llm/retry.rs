//! Retry with exponential backoff
//!
//! Classifies provider errors as retryable/non-retryable and computes a
//! jittered exponential delay between attempts.

use std::time::Duration;
use tokio::time::sleep;

use super::error::LLMError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.use_jitter {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = (rand_simple() * 2.0 - 1.0) * jitter_range;
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random for jitter (no external dependency).
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Classify whether an error is worth retrying.
pub fn is_retryable(error: &LLMError) -> bool {
    match error {
        LLMError::RateLimitExceeded => true,
        LLMError::NetworkError(_) => true,
        LLMError::ProviderError(msg) => {
            let lower = msg.to_lowercase();
            lower.contains("timeout")
                || lower.contains("temporarily")
                || lower.contains("overloaded")
                || lower.contains("503")
                || lower.contains("502")
                || lower.contains("504")
                || lower.contains("529")
        }
        LLMError::ConfigError(_) => false,
        LLMError::InvalidResponse(_) => false,
        LLMError::ValidationError(_) => false,
        LLMError::ProviderNotImplemented(_) => false,
        LLMError::CacheError(_) => false,
        LLMError::DatabaseError(_) => false,
        LLMError::UnsupportedDimension { .. } => false,
        _ => false,
    }
}

#[derive(Debug)]
pub struct RetryResult<T> {
    pub result: Option<T>,
    pub errors: Vec<LLMError>,
    pub attempts: u32,
    pub total_time_ms: u64,
    pub success: bool,
}

impl<T> RetryResult<T> {
    pub fn into_result(self) -> Result<T, LLMError> {
        if let Some(result) = self.result {
            Ok(result)
        } else {
            Err(self
                .errors
                .into_iter()
                .last()
                .unwrap_or(LLMError::NetworkError("unknown error".to_string())))
        }
    }
}

/// Execute an async operation with retry logic.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> RetryResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, LLMError>>,
{
    use tokio::time::Instant;

    let start = Instant::now();
    let mut errors = Vec::new();
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                return RetryResult {
                    result: Some(result),
                    errors,
                    attempts: attempt + 1,
                    total_time_ms: start.elapsed().as_millis() as u64,
                    success: true,
                };
            }
            Err(e) => {
                let should_retry = is_retryable(&e) && attempt < config.max_retries;
                errors.push(e);

                if should_retry {
                    let delay = config.delay_for_attempt(attempt);
                    log::warn!(
                        "[llm::retry] attempt {} failed, retrying in {:?}",
                        attempt + 1,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                } else {
                    return RetryResult {
                        result: None,
                        errors,
                        attempts: attempt + 1,
                        total_time_ms: start.elapsed().as_millis() as u64,
                        success: false,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
            use_jitter: false,
            ..Default::default()
        };

        assert_eq!(config.delay_for_attempt(0).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 2000);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 8000);
        assert_eq!(config.delay_for_attempt(10).as_millis(), 10000);
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&LLMError::RateLimitExceeded));
        assert!(is_retryable(&LLMError::NetworkError("timeout".to_string())));
        assert!(!is_retryable(&LLMError::ConfigError("bad config".to_string())));
    }

    #[tokio::test]
    async fn test_with_retry_eventual_success() {
        let config = RetryConfig {
            max_retries: 3,
            initial_delay_ms: 10,
            use_jitter: false,
            ..Default::default()
        };

        let attempt = std::sync::atomic::AtomicU32::new(0);

        let result = with_retry(&config, || {
            let current = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if current < 2 {
                    Err(LLMError::RateLimitExceeded)
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_stops_immediately() {
        let config = RetryConfig::default();
        let calls = std::sync::atomic::AtomicU32::new(0);

        let result = with_retry(&config, || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err::<(), _>(LLMError::ConfigError("bad".to_string())) }
        })
        .await;

        assert!(!result.success);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
