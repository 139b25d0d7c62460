//! Retry logic for transient describe failures.
//!
//! Throttling and brief network failures are retried with exponential backoff
//! and jitter. Authorization failures are never retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{ApiError, DescribeRequest};
use crate::error::{ImportError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Fail on the first transient error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay for a given retry (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.jitter {
            capped_delay * (1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Run one describe call, retrying transient failures.
///
/// Exhausted retries become `ImportError::TransientApi`, authorization
/// failures become `ImportError::Auth` on the first occurrence.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, request: &DescribeRequest, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, ApiError>>,
{
    let operation = request.to_string();

    for attempt in 0..=config.max_retries {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = %operation,
                        attempt = attempt + 1,
                        "Describe call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(ApiError::Transient(message)) => {
                if attempt == config.max_retries {
                    warn!(
                        operation = %operation,
                        attempts = attempt + 1,
                        error = %message,
                        "Describe call failed after retries"
                    );
                    return Err(ImportError::TransientApi {
                        operation,
                        attempts: attempt + 1,
                        message,
                    });
                }

                let delay = config.calculate_delay(attempt);
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Transient describe failure, retrying"
                );
                sleep(delay).await;
            }
            Err(ApiError::Auth(message)) => {
                return Err(ImportError::Auth { operation, message });
            }
            Err(ApiError::Failed(message)) => {
                return Err(ImportError::Api { operation, message });
            }
        }
    }

    // The loop always returns on its last iteration.
    Err(ImportError::TransientApi {
        operation,
        attempts: config.max_retries + 1,
        message: "retries exhausted".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.calculate_delay(0), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(400));
        assert_eq!(config.calculate_delay(10), Duration::from_millis(5_000));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig::default();
        for attempt in 0..4 {
            let delay = config.calculate_delay(attempt).as_millis() as f64;
            let base = (200.0 * 2f64.powi(attempt as i32)).min(5_000.0);
            assert!(delay >= base && delay <= base * 1.25);
        }
    }

    #[test]
    fn test_jitter_varies_delays() {
        let config = RetryConfig::default();
        let delays: std::collections::BTreeSet<Duration> =
            (0..64).map(|_| config.calculate_delay(3)).collect();
        assert!(delays.len() > 1);
        assert!(delays.iter().all(|d| *d < Duration::from_millis(2_000)));
    }

    #[tokio::test]
    async fn test_default_allows_five_attempts() {
        let config = RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 1,
            jitter: false,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let err = with_retry(&config, &DescribeRequest::TransitGateways, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ApiError::Transient("Throttling".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match err {
            ImportError::TransientApi { attempts, .. } => assert_eq!(attempts, 5),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&quick(), &DescribeRequest::TransitGateways, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ApiError::Transient("Throttling".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempts() {
        let err = with_retry(&quick(), &DescribeRequest::RouteTables, || async {
            Err::<(), _>(ApiError::Transient("RequestLimitExceeded".into()))
        })
        .await
        .unwrap_err();

        match err {
            ImportError::TransientApi { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_auth_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&quick(), &DescribeRequest::Attachments, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ApiError::Auth("UnauthorizedOperation".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.exit_code(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
