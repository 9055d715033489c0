//! Reconnection policy shared by both channel variants.

use std::time::Duration;

/// Failed connection attempts allowed before a channel gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Fixed pause between a failure and the next connection attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Bounded, fixed-delay retry. No backoff, no jitter.
///
/// `max_attempts` counts consecutive failures; reaching it fails the channel.
/// The count resets whenever a well-formed message arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is at least 1: the first connection always counts.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// One connection attempt, no reconnection.
    pub fn single_shot() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn retries(&self) -> bool {
        self.max_attempts > 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay, Duration::from_secs(3));
        assert!(policy.retries());
    }

    #[test]
    fn test_single_shot_and_floor() {
        assert!(!RetryPolicy::single_shot().retries());
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }
}
