//! Reconnection Policy
//!
//! Fixed-delay retry for transport failures. Network errors are retried
//! indefinitely on the same delay; the UI already reflects the
//! `Reconnecting`/`Disconnected` status, so no exponential growth is needed.
//!
//! Authentication failures do NOT go through this policy: a rejected
//! credential is retried exactly once per failure via the connection
//! manager's one-shot delayed path, after the stale transport has been torn
//! down (see [`super::connection`]).

use std::time::Duration;

/// Fixed-delay reconnection policy with attempt counting.
///
/// # Example
///
/// ```rust
/// use quote_stream::infrastructure::broker::reconnect::FixedBackoff;
/// use std::time::Duration;
///
/// let mut policy = FixedBackoff::new(Duration::from_secs(1));
/// assert_eq!(policy.next_delay(), Duration::from_secs(1));
/// assert_eq!(policy.attempt_count(), 1);
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct FixedBackoff {
    delay: Duration,
    attempt_count: u32,
}

impl FixedBackoff {
    /// Create a policy with the given fixed delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Always the configured fixed delay;
    /// retries are unlimited.
    #[must_use]
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count += 1;
        self.delay
    }

    /// Reset the attempt counter after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Number of attempts since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}
