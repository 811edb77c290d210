//! Exponential backoff for transient failures.

use backon::ExponentialBuilder;

use crate::config::RetryConfig;

/// Backoff schedule for the configured retry budget.
///
/// `max_retries` counts retries after the first attempt.
pub fn backoff(config: &RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(config.min_delay)
        .with_max_delay(config.max_delay)
        .with_max_times(config.max_retries)
}
