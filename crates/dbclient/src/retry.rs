//! Bounded exponential-backoff retry
//!
//! The delay after the `n`-th failed attempt is
//! `multiplier * 2^(n-1)` seconds clamped to `[initial_delay, max_delay]`.
//! With the defaults (10 attempts, 5s, 10s, multiplier 1) that is
//! 5, 5, 5, 8, 10, 10, 10, 10, 10 seconds between the ten attempts.

use crate::error::DbClientError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DbClientError {
    fn is_retryable(&self) -> bool {
        DbClientError::is_retryable(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after `failed_attempts` consecutive failures (1-based).
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(63) as i32;
        let seconds = self.multiplier * 2f64.powi(exponent);
        let wanted = Duration::try_from_secs_f64(seconds).unwrap_or(self.max_delay);
        wanted.clamp(self.initial_delay, self.max_delay.max(self.initial_delay))
    }
}

/// `retry:` section of the job file, all keys optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: Option<u32>,
    pub initial_delay_secs: Option<f64>,
    pub max_delay_secs: Option<f64>,
    pub multiplier: Option<f64>,
}

impl RetrySettings {
    pub fn to_policy(&self) -> Result<RetryPolicy, DbClientError> {
        let defaults = RetryPolicy::default();
        let seconds = |value: Option<f64>, default: Duration, key: &str| match value {
            None => Ok(default),
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|_| DbClientError::config(format!("retry.{} must be a non-negative number", key))),
        };

        let policy = RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_delay: seconds(self.initial_delay_secs, defaults.initial_delay, "initial_delay_secs")?,
            max_delay: seconds(self.max_delay_secs, defaults.max_delay, "max_delay_secs")?,
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
        };

        if policy.max_attempts == 0 {
            return Err(DbClientError::config("retry.max_attempts must be at least 1"));
        }
        if !policy.multiplier.is_finite() || policy.multiplier < 0.0 {
            return Err(DbClientError::config("retry.multiplier must be a non-negative number"));
        }

        Ok(policy)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_attempts` attempts have failed. The last error is returned.
pub async fn retry_async<T, E, F, Fut>(operation_name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Retryable,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                error!(operation = operation_name, error = %e, "Failed with a non-retryable error");
                return Err(e);
            },
            Err(e) if attempt >= max_attempts => {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "Giving up after {} attempts",
                    attempt
                );
                return Err(e);
            },
            Err(e) => {
                let delay = policy.delay_after(attempt);
                info!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Retrying {} in {:.1} seconds",
                    operation_name,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            },
        }
    }
}
