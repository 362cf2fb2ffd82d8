//! Retry with exponential backoff and full jitter.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info_span, warn, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_retry;

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Base delay for exponential backoff (ms)
    pub base_delay_ms: u64,
    /// Delay cap (ms)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: u64| -> u64 {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(fallback)
        };

        Self {
            max_retries: read("FIRESTORE_MAX_RETRIES", defaults.max_retries as u64) as u32,
            base_delay_ms: read("FIRESTORE_RETRY_BASE_MS", defaults.base_delay_ms),
            max_delay_ms: read("FIRESTORE_RETRY_MAX_MS", defaults.max_delay_ms),
        }
    }

    /// No retries and no delay.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Run `op`, retrying retryable failures (network, 429, 5xx).
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> FirestoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = FirestoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        let span = info_span!("firestore_retry", operation = %operation, attempt = attempt + 1);
        match op().instrument(span).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = backoff_delay(config, attempt, e.retry_after_ms());
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Firestore operation failed, retrying: {}",
                    e
                );
                record_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Pseudo-random fraction in `[0, 1)` from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Backoff for `attempt` (0-based). A server-provided hint takes precedence.
pub(crate) fn backoff_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    if let Some(hint) = retry_after_ms {
        return Duration::from_millis(hint);
    }

    let ceiling = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(20))
        .min(config.max_delay_ms);
    let jittered = (ceiling as f64 * jitter_fraction()) as u64;

    Duration::from_millis(jittered.max(config.base_delay_ms))
}
