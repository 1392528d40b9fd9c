// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff for the durable retry queue.

use std::time::Duration;

/// Attempt-indexed backoff: `base * 2^(attempt - 1)`, capped.
///
/// The delay depends only on the attempt count, so a restarted process
/// computes the same schedule as the one that recorded the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempts_made` failures.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for(3), Duration::from_secs(120));
        assert_eq!(policy.delay_for(7), Duration::from_secs(1800));
    }

    #[test]
    fn zero_attempts_uses_base() {
        assert_eq!(
            RetryPolicy::default().delay_for(0),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn exhaustion_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(4));
        assert!(policy.is_exhausted(5));
    }

    proptest! {
        #[test]
        fn delay_is_monotonic_and_capped(attempt in 0u32..10_000) {
            let policy = RetryPolicy::default();
            let here = policy.delay_for(attempt);
            let next = policy.delay_for(attempt.saturating_add(1));
            prop_assert!(here <= next);
            prop_assert!(next <= policy.max_delay);
        }
    }
}
