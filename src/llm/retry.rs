//! Retry logic for completion backend calls
//!
//! Exponential backoff with jitter for transient HTTP errors, honoring
//! `Retry-After` on rate-limited responses. Retries only happen before any
//! response bytes are consumed, so a streamed reply is never duplicated.
//!
//! ## Retryable Status Codes
//!
//! - 429: Too Many Requests
//! - 500, 502, 503: transient server errors
//! - 529: Overloaded

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::CompletionError;

/// Configuration for backend retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential growth)
    pub max_delay_ms: u64,
    /// HTTP status codes that trigger a retry
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            retryable_status_codes: vec![429, 500, 502, 503, 529],
        }
    }
}

impl RetryConfig {
    /// Create a retry config with no retries (disabled)
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_status_codes.contains(&status.as_u16())
    }

    /// Delay for a given attempt number (0-indexed)
    ///
    /// `base_delay * 2^attempt`, capped at `max_delay`, with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp_delay = self.base_delay_ms.saturating_mul(1u64 << attempt.min(10));
        let capped = exp_delay.min(self.max_delay_ms);

        let jitter_range = capped / 4;
        let delay = if jitter_range > 0 {
            let offset = (attempt as u64 * 7 + 3) % (jitter_range * 2 + 1);
            capped - jitter_range + offset
        } else {
            capped
        };

        Duration::from_millis(delay)
    }

    /// Parse a `Retry-After` header in (possibly fractional) seconds.
    ///
    /// Returns `None` if missing, unparseable, or outside (0, 300].
    pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
        let value = header_value?.trim();
        let seconds = value.parse::<f64>().ok()?;
        (seconds > 0.0 && seconds <= 300.0).then(|| Duration::from_secs_f64(seconds))
    }
}

/// Outcome of a single HTTP attempt, used by the retry loop
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    Retryable {
        status: StatusCode,
        body: String,
        retry_after: Option<Duration>,
    },
    /// Non-retryable failure, returned immediately
    Fatal(CompletionError),
}

/// Execute an async operation with retry logic.
///
/// After exhausting retries the last status is classified into a
/// [`CompletionError`].
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, CompletionError>
where
    F: Fn(u32) -> Fut,
    Fut: std::future::Future<Output = AttemptOutcome<T>>,
{
    let mut last_status = StatusCode::INTERNAL_SERVER_ERROR;
    let mut last_body = String::new();

    for attempt in 0..=config.max_retries {
        match operation(attempt).await {
            AttemptOutcome::Success(value) => {
                if attempt > 0 {
                    tracing::info!(retries = attempt, "Completion request succeeded after retry");
                }
                return Ok(value);
            }
            AttemptOutcome::Fatal(err) => return Err(err),
            AttemptOutcome::Retryable {
                status,
                body,
                retry_after,
            } => {
                last_status = status;
                last_body = body;

                if attempt < config.max_retries {
                    let delay = retry_after.unwrap_or_else(|| config.delay_for_attempt(attempt));
                    tracing::warn!(
                        "Completion request failed with {} (attempt {}/{}), retrying in {:?}",
                        status,
                        attempt + 1,
                        config.max_retries + 1,
                        delay,
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(CompletionError::from_status(last_status.as_u16(), last_body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retryable_status_codes, vec![429, 500, 502, 503, 529]);
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }

    #[test]
    fn test_is_retryable_status() {
        let config = RetryConfig::default();
        assert!(config.is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(config.is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(config.is_retryable_status(StatusCode::from_u16(529).unwrap()));
        assert!(!config.is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!config.is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_delay_for_attempt_exponential() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            ..Default::default()
        };
        let d0 = config.delay_for_attempt(0).as_millis();
        let d2 = config.delay_for_attempt(2).as_millis();
        assert!((750..=1250).contains(&d0));
        assert!((3000..=5000).contains(&d2));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            ..Default::default()
        };
        assert!(config.delay_for_attempt(10).as_millis() <= 6250);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            RetryConfig::parse_retry_after(Some("5")),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            RetryConfig::parse_retry_after(Some("1.5")),
            Some(Duration::from_secs_f64(1.5))
        );
        assert_eq!(RetryConfig::parse_retry_after(None), None);
        assert_eq!(RetryConfig::parse_retry_after(Some("soon")), None);
        assert_eq!(RetryConfig::parse_retry_after(Some("-1")), None);
        assert_eq!(RetryConfig::parse_retry_after(Some("301")), None);
    }

    #[tokio::test]
    async fn test_with_retry_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&fast_config(3), |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    AttemptOutcome::Retryable {
                        status: StatusCode::SERVICE_UNAVAILABLE,
                        body: "busy".into(),
                        retry_after: None,
                    }
                } else {
                    AttemptOutcome::Success("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausted_classifies_status() {
        let result: Result<(), _> = with_retry(&fast_config(1), |_| async {
            AttemptOutcome::Retryable {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: "slow down".into(),
                retry_after: None,
            }
        })
        .await;

        match result {
            Err(CompletionError::RateLimited { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_retry_fatal_is_immediate() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> = with_retry(&fast_config(5), |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                AttemptOutcome::Fatal(CompletionError::Auth {
                    status: 401,
                    body: "bad key".into(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(CompletionError::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
