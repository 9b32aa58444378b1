//! Reconnection Policy
//!
//! Exponential backoff for reconnect attempts: attempt `n` waits
//! `initial_delay * multiplier^(n-1)`, optionally capped and jittered.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay (`None` = uncapped).
    pub max_delay: Option<Duration>,
    /// Multiplier for exponential backoff (2.0 doubles each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (0.1 = ±10%). Zero gives exact delays.
    pub jitter_factor: f64,
    /// Attempts allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Some(Duration::from_secs(60)),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `ConnectionSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::ConnectionSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_interval,
            max_delay: settings.reconnect_delay_max,
            multiplier: 2.0,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Delay for attempt `attempt` (1-based), before jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);

        #[allow(clippy::cast_precision_loss)]
        let scaled = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        let millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            {
                scaled.round().min(u64::MAX as f64) as u64
            }
        } else if scaled.is_infinite() {
            u64::MAX
        } else {
            0
        };

        let delay = Duration::from_millis(millis);
        self.max_delay.map_or(delay, |cap| delay.min(cap))
    }
}

/// Reconnection policy implementing exponential backoff.
///
/// # Example
///
/// ```rust
/// use market_feed_client::infrastructure::connection::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Consume one attempt and return its delay.
    ///
    /// Returns `None` once `max_attempts` attempts have been handed out.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count += 1;
        let delay = self.config.delay_for_attempt(self.attempt_count);

        Some(self.apply_jitter(delay))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// The policy configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn exact(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: None,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Some(Duration::from_secs(60)));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 5);
    }

    #[test_case(1, 1000 ; "first attempt")]
    #[test_case(2, 2000 ; "second attempt")]
    #[test_case(3, 4000 ; "third attempt")]
    #[test_case(4, 8000 ; "fourth attempt")]
    #[test_case(5, 16000 ; "fifth attempt")]
    fn delay_doubles_per_attempt(attempt: u32, expected_ms: u64) {
        assert_eq!(
            exact(0).delay_for_attempt(attempt),
            Duration::from_millis(expected_ms)
        );
    }

    #[test]
    fn policy_hands_out_sequence() {
        let mut policy = ReconnectPolicy::new(exact(0));

        let delays: Vec<_> = (0..4).filter_map(|_| policy.next_delay()).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
            ]
        );
    }

    #[test]
    fn policy_max_delay_cap() {
        let config = ReconnectConfig {
            max_delay: Some(Duration::from_millis(2500)),
            ..exact(0)
        };
        let mut policy = ReconnectPolicy::new(config);

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1000)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(2000)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(2500)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy = ReconnectPolicy::new(exact(3));

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 3);

        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
        assert_eq!(policy.attempt_count(), 3);
    }

    #[test]
    fn policy_reset() {
        let mut policy = ReconnectPolicy::new(exact(3));
        let _ = policy.next_delay();
        let _ = policy.next_delay();

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(1000)));
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 0,
            ..Default::default()
        });

        for _ in 0..1000 {
            assert!(policy.next_delay().is_some());
        }
    }

    #[test]
    fn huge_attempt_saturates_instead_of_overflowing() {
        let delay = exact(0).delay_for_attempt(u32::MAX);
        assert!(delay >= Duration::from_secs(1));
    }

    #[test]
    fn policy_jitter_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                jitter_factor: 0.1,
                ..exact(0)
            });

            let millis = policy.next_delay().unwrap().as_millis();

            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }

    proptest! {
        #[test]
        fn delays_never_decrease_and_respect_cap(base_ms in 1u64..5_000, cap_ms in 1u64..120_000) {
            let config = ReconnectConfig {
                initial_delay: Duration::from_millis(base_ms),
                max_delay: Some(Duration::from_millis(cap_ms)),
                ..exact(0)
            };

            let mut previous = Duration::ZERO;
            for attempt in 1..=20 {
                let delay = config.delay_for_attempt(attempt);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= Duration::from_millis(cap_ms));
                previous = delay;
            }
        }
    }
}
