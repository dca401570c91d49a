//! Retry budget for upload jobs
//!
//! A job that fails transiently goes back to the queue and is retried after a backoff delay
//! until `max_attempts` retries have been spent. Permanent failures are never retried
//! automatically.

use super::{ErrorClass, classify_error};
use crate::error::CaptureError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for upload jobs
///
/// # Example
/// ```
/// use walkcap_core::recovery::RetryConfig;
/// use std::time::Duration;
///
/// let config = RetryConfig::default()
///     .with_max_attempts(5)
///     .with_initial_delay(Duration::from_millis(200));
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Automatic retries allowed after the first attempt
    pub max_attempts: u32,
    /// Initial delay before first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set max attempts
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set initial delay before first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }
}

const JITTER_RATIO: f64 = 0.2;

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Requeue after the delay
    RetryAfter(Duration),
    /// Stop and surface the error
    GiveUp,
}

/// Applies a [`RetryConfig`] to failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Exponential delay for the given retry (0-indexed), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.initial_delay.as_secs_f64()
            * self.config.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.config.max_delay.as_secs_f64());
        if !self.config.jitter {
            return Duration::from_secs_f64(capped);
        }
        Duration::from_secs_f64(capped + rand_jitter(capped * JITTER_RATIO))
    }

    /// Decide after `retries_used` automatic retries have already been spent
    pub fn decide(&self, error: &CaptureError, retries_used: u32) -> RetryDecision {
        if classify_error(error) == ErrorClass::Permanent {
            return RetryDecision::GiveUp;
        }
        if retries_used >= self.config.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay_for_attempt(retries_used))
    }
}

/// Hash-based pseudo-random jitter in `[0, range)`
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let hash = nanos.wrapping_mul(2654435761);
    let normalized = (hash as f64) / (u32::MAX as f64);

    normalized * range
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_max_attempts(max_attempts)
                .with_initial_delay(Duration::from_millis(100))
                .with_jitter(false),
        )
    }

    #[test]
    fn test_transient_errors_retry_until_budget() {
        let policy = policy(2);
        let err = CaptureError::upload_transient("connection reset");

        assert_eq!(
            policy.decide(&err, 0),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(&err, 1),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(policy.decide(&err, 2), RetryDecision::GiveUp);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(
            RetryConfig {
                max_delay: Duration::from_secs(5),
                ..RetryConfig::default()
            }
            .with_jitter(false),
        );
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_ratio() {
        let policy = RetryPolicy::new(RetryConfig::default());
        let delay = policy.delay_for_attempt(0);
        assert!(delay >= Duration::from_secs(1));
        assert!(delay <= Duration::from_millis(1200));
    }

    #[test]
    fn test_permanent_errors_give_up() {
        let policy = policy(10);
        let err = CaptureError::upload_permanent("quota exceeded");
        assert_eq!(policy.decide(&err, 0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_retry_config_serde_humantime() {
        let config: RetryConfig = toml::from_str(
            r#"
max_attempts = 3
initial_delay = "250ms"
max_delay = "30s"
"#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.jitter);
    }
}
