//! Centralized configuration for the kiln client.
//!
//! Constants live on [`RpcConfig`]; per-client overrides go through the
//! [`ClientOptions`] builder.

use crate::retry::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Control socket and wire protocol defaults.
pub struct RpcConfig;

impl RpcConfig {
    pub const DEFAULT_SOCKET_PATH: &'static str = "/run/kilnd.socket";
    pub const SOCKET_PATH_ENV: &'static str = "KILN_SOCKET";
    pub const DEFAULT_RETRIES: u32 = 5;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
    pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024; // 32MB
    pub const FRAME_HEADER_LEN: usize = 4;
}

/// Options for constructing a [`crate::Client`].
///
/// # Example
///
/// ```rust,ignore
/// use kiln_core::{Client, ClientOptions};
/// use std::time::Duration;
///
/// let mut client = Client::new(
///     ClientOptions::new()
///         .with_socket_path("/tmp/kilnd.socket")
///         .with_retries(2)
///         .with_retry_delay(Duration::from_millis(50)),
/// );
/// let names = client.list()?;
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub socket_path: PathBuf,
    /// Extra attempts after the first one failed with a retryable error.
    pub retries: u32,
    /// Fixed delay slept between attempts.
    pub retry_delay: Duration,
    /// Read timeout on the socket. `None` blocks until the daemon answers,
    /// which `wait` relies on.
    pub receive_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(RpcConfig::DEFAULT_SOCKET_PATH),
            retries: RpcConfig::DEFAULT_RETRIES,
            retry_delay: RpcConfig::DEFAULT_RETRY_DELAY,
            receive_timeout: None,
        }
    }
}

impl ClientOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the daemon socket path.
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Set the number of retries after the first attempt.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the fixed delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Bound every blocking receive. A timed-out read counts as a
    /// retryable transport failure.
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_retries(self.retries)
            .with_delay(self.retry_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(
            options.socket_path,
            PathBuf::from(RpcConfig::DEFAULT_SOCKET_PATH)
        );
        assert_eq!(options.retries, RpcConfig::DEFAULT_RETRIES);
        assert!(options.receive_timeout.is_none());
    }

    #[test]
    fn test_retry_policy_follows_options() {
        let policy = ClientOptions::new()
            .with_retries(7)
            .with_retry_delay(Duration::from_millis(5))
            .retry_policy();
        assert_eq!(policy.retries, 7);
        assert_eq!(policy.delay, Duration::from_millis(5));
    }
}
