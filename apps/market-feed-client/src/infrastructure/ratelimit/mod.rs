//! Rate Limiter
//!
//! Per-key sliding-window counter. A key may make `max_requests` calls in
//! any trailing `window`; a timestamp `t` counts while `now - t < window`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::infrastructure::metrics;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Calls admitted per window.
    pub max_requests: usize,
    /// Length of the trailing window.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl From<&crate::RateLimitSettings> for RateLimitConfig {
    fn from(settings: &crate::RateLimitSettings) -> Self {
        Self {
            max_requests: settings.max_requests,
            window: settings.window,
        }
    }
}

/// Sliding-window rate limiter keyed by caller-chosen strings.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use market_feed_client::infrastructure::ratelimit::{RateLimitConfig, RateLimiter};
///
/// let limiter = RateLimiter::new(RateLimitConfig {
///     max_requests: 2,
///     window: Duration::from_secs(1),
/// });
///
/// assert!(limiter.try_acquire("quotes"));
/// assert!(limiter.try_acquire("quotes"));
/// assert!(!limiter.try_acquire("quotes"));
/// assert!(limiter.try_acquire("news"));
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a limiter with no history.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit one call for `key` if the window has room, recording it.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_owned()).or_default();
        self.prune(window, now);

        if window.len() >= self.config.max_requests {
            drop(windows);
            metrics::record_rate_limited();
            tracing::debug!(key, "Rate limited");
            return false;
        }

        window.push_back(now);
        true
    }

    /// Calls `key` may still make in the current window. Does not consume.
    #[must_use]
    pub fn remaining(&self, key: &str) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        let used = windows.get_mut(key).map_or(0, |window| {
            self.prune(window, now);
            window.len()
        });
        forget_if_empty(&mut windows, key);

        self.config.max_requests.saturating_sub(used)
    }

    /// Time until the oldest call still in the window leaves it (zero when
    /// the window is empty).
    #[must_use]
    pub fn reset_in(&self, key: &str) -> Duration {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        let oldest = windows.get_mut(key).and_then(|window| {
            self.prune(window, now);
            window.front().copied()
        });
        forget_if_empty(&mut windows, key);

        oldest.map_or(Duration::ZERO, |oldest| {
            (oldest + self.config.window).saturating_duration_since(now)
        })
    }

    /// Forget all history for `key`.
    pub fn reset(&self, key: &str) {
        self.windows.lock().remove(key);
    }

    /// Wait until a call for `key` is admitted, then record it.
    ///
    /// With `max_requests == 0` this never returns.
    pub async fn acquire(&self, key: &str) {
        loop {
            if self.try_acquire(key) {
                return;
            }

            // An empty window still rejects only when max_requests is zero.
            let wait = self.reset_in(key).max(Duration::from_millis(1));
            tracing::debug!(key, wait_ms = wait.as_millis(), "Waiting for rate limit window");
            tokio::time::sleep(wait).await;
        }
    }

    fn prune(&self, window: &mut VecDeque<Instant>, now: Instant) {
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.config.window)
        {
            window.pop_front();
        }
    }
}

fn forget_if_empty(windows: &mut HashMap<String, VecDeque<Instant>>, key: &str) {
    if windows.get(key).is_some_and(VecDeque::is_empty) {
        windows.remove(key);
    }
}
