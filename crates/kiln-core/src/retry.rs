//! Blocking retry with a fixed delay.
//!
//! Provides the retry primitive the RPC engine drives its reconnect loop
//! with:
//! - A bounded number of retries after the first attempt
//! - A fixed sleep between attempts on the calling thread
//! - A predicate deciding which errors are worth another attempt
//! - Statistics about what happened

use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to retry and how long to sleep in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one failed.
    pub retries: u32,
    /// Delay slept before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: crate::config::RpcConfig::DEFAULT_RETRIES,
            delay: crate::config::RpcConfig::DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Never retry.
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Upper bound on attempts, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total delay slept.
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded.
    pub success: bool,
    /// Last error message if failed.
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or the policy's retries are used up.
///
/// Returns the last result together with the statistics.
pub fn retry_blocking<F, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let mut budget = policy.retries;

    loop {
        stats.attempts += 1;

        let err = match operation() {
            Ok(value) => {
                stats.success = true;
                if stats.attempts > 1 {
                    debug!("Operation succeeded after {} attempts", stats.attempts);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };

        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!("Error is not retryable: {}", err);
            return (Err(err), stats);
        }

        if budget == 0 {
            if policy.retries > 0 {
                warn!(
                    "All {} attempts exhausted. Last error: {}",
                    stats.attempts, err
                );
            }
            return (Err(err), stats);
        }
        budget -= 1;

        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            stats.attempts,
            policy.max_attempts(),
            err,
            policy.delay
        );

        stats.total_delay += policy.delay;
        thread::sleep(policy.delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_retry_succeeds_first_try() {
        let policy = RetryPolicy::new().with_retries(3);

        let (result, stats) = retry_blocking(&policy, || Ok::<_, String>(42), |_: &String| true);

        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 1);
        assert!(stats.success);
        assert_eq!(stats.total_delay, Duration::ZERO);
    }

    #[test]
    fn test_retry_succeeds_after_failures() {
        let policy = RetryPolicy::new()
            .with_retries(3)
            .with_delay(Duration::from_millis(1));

        let mut count = 0;
        let (result, stats) = retry_blocking(
            &policy,
            || {
                count += 1;
                if count < 3 {
                    Err("temporary failure".to_string())
                } else {
                    Ok(42)
                }
            },
            |_: &String| true,
        );

        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 3);
        assert!(stats.success);
    }

    #[test]
    fn test_retry_exhausted_sleeps_between_attempts() {
        let policy = RetryPolicy::new()
            .with_retries(3)
            .with_delay(Duration::from_millis(20));

        let started = Instant::now();
        let (result, stats) = retry_blocking(
            &policy,
            || Err::<i32, _>("always fails".to_string()),
            |_: &String| true,
        );

        assert!(result.is_err());
        assert_eq!(stats.attempts, 4);
        assert!(!stats.success);
        assert_eq!(stats.last_error, Some("always fails".to_string()));
        assert_eq!(stats.total_delay, Duration::from_millis(60));
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_retry_non_retryable_error() {
        let policy = RetryPolicy::new()
            .with_retries(3)
            .with_delay(Duration::from_secs(10));

        let (result, stats) = retry_blocking(
            &policy,
            || Err::<i32, _>("permanent failure".to_string()),
            |e: &String| !e.contains("permanent"),
        );

        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.total_delay, Duration::ZERO);
    }

    #[test]
    fn test_no_retries_policy() {
        let (result, stats) =
            retry_blocking(&RetryPolicy::none(), || Err::<(), _>("nope"), |_: &&str| true);

        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
    }
}
