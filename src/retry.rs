//! Retry for rate-limited remote calls.
//!
//! Only failures that look like rate limiting are retried. Everything else
//! propagates on the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Delay before the first retry. Doubles on every subsequent retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .without_max_delay()
    }
}

/// Emitted before every retry wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryNotice {
    /// 1-based index of the attempt that was rate limited.
    pub attempt: usize,
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryNotice {
    pub fn message(&self) -> String {
        format!(
            "Rate limited, retrying in {}s (attempt {}/{})",
            self.delay.as_secs(),
            self.attempt,
            self.max_attempts
        )
    }

    /// One line per remaining second of the wait, for hosts that render a
    /// live countdown.
    pub fn countdown(&self) -> impl Iterator<Item = String> {
        (1..=self.delay.as_secs())
            .rev()
            .map(|remaining| format!("Retrying in {remaining}s..."))
    }
}

/// Whether an error message describes a rate-limited response.
pub fn is_rate_limited(message: &str) -> bool {
    message.contains("429") || message.to_lowercase().contains("rate limit")
}

/// Runs `operation`, retrying rate-limited failures with exponential delay.
///
/// `on_retry` is called with a [`RetryNotice`] before every wait. When all
/// attempts are used up the last error is returned.
pub async fn retry_rate_limited<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
    mut on_retry: impl FnMut(&RetryNotice),
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;

    operation
        .retry(policy.backoff())
        .when(|err: &E| is_rate_limited(&err.to_string()))
        .notify(|err: &E, delay| {
            attempt += 1;
            let notice = RetryNotice {
                attempt,
                max_attempts: policy.max_attempts,
                delay,
            };
            warn!(%err, attempt, ?delay, "Rate limited, retrying");
            on_retry(&notice);
        })
        .await
}
