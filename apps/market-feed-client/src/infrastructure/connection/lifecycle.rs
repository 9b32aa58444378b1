//! Connection Lifecycle State Machine
//!
//! Pure transition logic for the connection manager. Every state change goes
//! through one of the named transitions below; the manager's driver task only
//! performs the I/O those transitions ask for.

use std::time::Duration;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::connection::ConnectionState;

/// What to do after the transport went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then open again.
    Retry {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Backoff delay.
        delay: Duration,
    },
    /// Attempts exhausted; the lifecycle is now `Closed`.
    GiveUp {
        /// Configured attempt limit that was reached.
        attempts: u32,
    },
}

/// Result of the `lost` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lost {
    /// Whether the connection had been `Open` (as opposed to failing to open).
    pub was_open: bool,
    /// Next step.
    pub decision: RetryDecision,
}

/// Connection lifecycle state machine.
///
/// # Example
///
/// ```rust
/// use market_feed_client::domain::connection::ConnectionState;
/// use market_feed_client::infrastructure::connection::{Lifecycle, ReconnectConfig, RetryDecision};
///
/// let mut lifecycle = Lifecycle::new(ReconnectConfig::default());
/// assert!(lifecycle.start());
/// assert!(lifecycle.opened());
///
/// let lost = lifecycle.lost().unwrap();
/// assert!(lost.was_open);
/// assert!(matches!(lost.decision, RetryDecision::Retry { attempt: 1, .. }));
/// assert_eq!(lifecycle.state(), ConnectionState::Reconnecting);
/// ```
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: ConnectionState,
    policy: ReconnectPolicy,
}

impl Lifecycle {
    /// Create a lifecycle in the `Idle` state.
    #[must_use]
    pub const fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            state: ConnectionState::Idle,
            policy: ReconnectPolicy::new(reconnect),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub const fn reconnect_attempt(&self) -> u32 {
        self.policy.attempt_count()
    }

    /// `connect()` requested.
    ///
    /// Returns `false` (no-op) when already `Connecting` or `Open`. From
    /// `Reconnecting` the pending backoff is skipped and the attempt count is
    /// kept; from any resting state the attempt budget starts fresh.
    pub const fn start(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => false,
            ConnectionState::Reconnecting => {
                self.state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Idle | ConnectionState::Closing | ConnectionState::Closed => {
                self.policy.reset();
                self.state = ConnectionState::Connecting;
                true
            }
        }
    }

    /// The transport finished opening.
    ///
    /// Returns `false` if the lifecycle was not `Connecting` (the open raced
    /// with a disconnect and must be discarded).
    pub const fn opened(&mut self) -> bool {
        if matches!(self.state, ConnectionState::Connecting) {
            self.state = ConnectionState::Open;
            self.policy.reset();
            true
        } else {
            false
        }
    }

    /// The transport closed or failed while `Connecting` or `Open`.
    ///
    /// Returns `None` when the loss is irrelevant (already closing or closed).
    pub fn lost(&mut self) -> Option<Lost> {
        let was_open = match self.state {
            ConnectionState::Open => true,
            ConnectionState::Connecting => false,
            _ => return None,
        };

        let decision = if let Some(delay) = self.policy.next_delay() {
            self.state = ConnectionState::Reconnecting;
            RetryDecision::Retry {
                attempt: self.policy.attempt_count(),
                delay,
            }
        } else {
            self.state = ConnectionState::Closed;
            RetryDecision::GiveUp {
                attempts: self.policy.config().max_attempts,
            }
        };

        Some(Lost { was_open, decision })
    }

    /// The backoff delay elapsed.
    ///
    /// Returns `false` if the lifecycle left `Reconnecting` in the meantime.
    pub const fn retry_due(&mut self) -> bool {
        if matches!(self.state, ConnectionState::Reconnecting) {
            self.state = ConnectionState::Connecting;
            true
        } else {
            false
        }
    }

    /// Explicit `disconnect()` started. Returns the state it interrupted.
    pub const fn begin_close(&mut self) -> ConnectionState {
        let previous = self.state;
        self.state = ConnectionState::Closing;
        previous
    }

    /// Explicit `disconnect()` finished.
    pub const fn finish_close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: None,
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn starts_idle() {
        let lifecycle = Lifecycle::new(config(5));
        assert_eq!(lifecycle.state(), ConnectionState::Idle);
        assert_eq!(lifecycle.reconnect_attempt(), 0);
    }

    #[test]
    fn start_is_noop_when_active() {
        let mut lifecycle = Lifecycle::new(config(5));
        assert!(lifecycle.start());
        assert!(!lifecycle.start());

        assert!(lifecycle.opened());
        assert!(!lifecycle.start());
        assert_eq!(lifecycle.state(), ConnectionState::Open);
    }

    #[test]
    fn open_resets_attempts() {
        let mut lifecycle = Lifecycle::new(config(5));
        lifecycle.start();
        lifecycle.lost();
        lifecycle.retry_due();
        lifecycle.lost();
        assert_eq!(lifecycle.reconnect_attempt(), 2);

        lifecycle.retry_due();
        assert!(lifecycle.opened());

        assert_eq!(lifecycle.reconnect_attempt(), 0);
    }

    #[test]
    fn loss_while_open_schedules_retry() {
        let mut lifecycle = Lifecycle::new(config(5));
        lifecycle.start();
        lifecycle.opened();

        let lost = lifecycle.lost().unwrap();

        assert_eq!(
            lost,
            Lost {
                was_open: true,
                decision: RetryDecision::Retry {
                    attempt: 1,
                    delay: Duration::from_millis(1000)
                }
            }
        );
        assert_eq!(lifecycle.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn failed_open_is_not_was_open() {
        let mut lifecycle = Lifecycle::new(config(5));
        lifecycle.start();

        let lost = lifecycle.lost().unwrap();

        assert!(!lost.was_open);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut lifecycle = Lifecycle::new(config(2));
        lifecycle.start();

        assert!(matches!(
            lifecycle.lost().unwrap().decision,
            RetryDecision::Retry { attempt: 1, .. }
        ));
        lifecycle.retry_due();
        assert!(matches!(
            lifecycle.lost().unwrap().decision,
            RetryDecision::Retry { attempt: 2, .. }
        ));
        lifecycle.retry_due();

        let lost = lifecycle.lost().unwrap();
        assert_eq!(lost.decision, RetryDecision::GiveUp { attempts: 2 });
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert_eq!(lifecycle.reconnect_attempt(), 2);
    }

    #[test]
    fn restart_after_give_up_gets_fresh_budget() {
        let mut lifecycle = Lifecycle::new(config(1));
        lifecycle.start();
        lifecycle.lost();
        lifecycle.retry_due();
        lifecycle.lost();
        assert_eq!(lifecycle.state(), ConnectionState::Closed);

        assert!(lifecycle.start());
        assert_eq!(lifecycle.reconnect_attempt(), 0);
        assert!(matches!(
            lifecycle.lost().unwrap().decision,
            RetryDecision::Retry { attempt: 1, .. }
        ));
    }

    #[test]
    fn connect_during_backoff_keeps_attempts() {
        let mut lifecycle = Lifecycle::new(config(5));
        lifecycle.start();
        lifecycle.lost();

        assert!(lifecycle.start());

        assert_eq!(lifecycle.state(), ConnectionState::Connecting);
        assert_eq!(lifecycle.reconnect_attempt(), 1);
    }

    #[test]
    fn loss_after_close_is_ignored() {
        let mut lifecycle = Lifecycle::new(config(5));
        lifecycle.start();
        lifecycle.opened();
        assert_eq!(lifecycle.begin_close(), ConnectionState::Open);
        lifecycle.finish_close();

        assert!(lifecycle.lost().is_none());
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[test]
    fn retry_after_close_is_ignored() {
        let mut lifecycle = Lifecycle::new(config(5));
        lifecycle.start();
        lifecycle.lost();
        lifecycle.begin_close();
        lifecycle.finish_close();

        assert!(!lifecycle.retry_due());
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[test]
    fn open_after_close_is_discarded() {
        let mut lifecycle = Lifecycle::new(config(5));
        lifecycle.start();
        lifecycle.begin_close();
        lifecycle.finish_close();

        assert!(!lifecycle.opened());
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    proptest! {
        #[test]
        fn attempts_never_exceed_limit(max_attempts in 1u32..10, failures in 0usize..40) {
            let mut lifecycle = Lifecycle::new(config(max_attempts));
            lifecycle.start();
            let mut give_ups = 0;

            for _ in 0..failures {
                match lifecycle.lost() {
                    Some(Lost { decision: RetryDecision::Retry { .. }, .. }) => {
                        prop_assert!(lifecycle.retry_due());
                    }
                    Some(Lost { decision: RetryDecision::GiveUp { .. }, .. }) => give_ups += 1,
                    None => {}
                }
                prop_assert!(lifecycle.reconnect_attempt() <= max_attempts);
            }

            prop_assert!(give_ups <= 1);
        }
    }
}
