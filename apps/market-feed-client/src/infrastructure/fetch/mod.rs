//! Cached Fetch
//!
//! Request/response access guarded by a [`ResultCache`] and a
//! [`RateLimiter`]. A cache hit returns immediately; a miss runs the loader
//! with exponential-backoff retries, each attempt first admitted by the
//! limiter. Only successful results are cached.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::cache::ResultCache;
use crate::infrastructure::metrics;
use crate::infrastructure::ratelimit::RateLimiter;

/// Errors returned by [`CachedFetcher::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The limiter rejected an attempt for this key.
    #[error("rate limited for {key}, window resets in {retry_in:?}")]
    RateLimited {
        /// Rate-limit key.
        key: String,
        /// Time until the oldest call leaves the window.
        retry_in: Duration,
    },

    /// The loader failed on its final attempt.
    #[error("loader failed: {0}")]
    Loader(#[from] anyhow::Error),
}

/// Retry behavior for failed loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles per retry.
    pub retry_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl From<&crate::FetchSettings> for FetchConfig {
    fn from(settings: &crate::FetchSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        }
    }
}

impl FetchConfig {
    /// Delay before retry `retry` (0-based): `retry_delay * 2^retry`.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.retry_delay
            .saturating_mul(2_u32.checked_pow(retry).unwrap_or(u32::MAX))
    }
}

/// Cache-first fetcher with rate limiting and retries.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use market_feed_client::infrastructure::cache::ResultCache;
/// use market_feed_client::infrastructure::fetch::{CachedFetcher, FetchConfig};
/// use market_feed_client::infrastructure::ratelimit::RateLimiter;
///
/// # async fn run() -> Result<(), market_feed_client::infrastructure::fetch::FetchError> {
/// let fetcher: CachedFetcher<String> = CachedFetcher::new(
///     Arc::new(ResultCache::default()),
///     Arc::new(RateLimiter::default()),
///     FetchConfig::default(),
/// );
///
/// let portfolio = fetcher
///     .fetch("/api/portfolio", || async { Ok("{\"cash\":1000}".to_string()) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CachedFetcher<V> {
    cache: Arc<ResultCache<V>>,
    limiter: Arc<RateLimiter>,
    config: FetchConfig,
}

impl<V> Clone for CachedFetcher<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            limiter: Arc::clone(&self.limiter),
            config: self.config,
        }
    }
}

impl<V: Clone> CachedFetcher<V> {
    /// Create a fetcher over a shared cache and limiter.
    #[must_use]
    pub const fn new(cache: Arc<ResultCache<V>>, limiter: Arc<RateLimiter>, config: FetchConfig) -> Self {
        Self {
            cache,
            limiter,
            config,
        }
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<ResultCache<V>> {
        &self.cache
    }

    /// The underlying limiter.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch `key`, caching a success under the cache's default TTL.
    ///
    /// `key` is both the cache key and the rate-limit key.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::RateLimited`] as soon as the limiter rejects an
    /// attempt, or [`FetchError::Loader`] with the last loader error once
    /// retries are exhausted.
    pub async fn fetch<F, Fut>(&self, key: &str, loader: F) -> Result<V, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        let ttl = Some(self.cache.default_ttl());
        self.cache
            .get_or_load(key, ttl, || self.load_with_retry(key, loader))
            .await
    }

    /// Drop the cached value for `key` and fetch it again.
    ///
    /// # Errors
    ///
    /// Same as [`fetch`](Self::fetch).
    pub async fn refetch<F, Fut>(&self, key: &str, loader: F) -> Result<V, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        self.cache.remove(key);
        self.fetch(key, loader).await
    }

    async fn load_with_retry<F, Fut>(&self, key: &str, mut loader: F) -> Result<V, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        let mut retry = 0;

        loop {
            if !self.limiter.try_acquire(key) {
                return Err(FetchError::RateLimited {
                    key: key.to_owned(),
                    retry_in: self.limiter.reset_in(key),
                });
            }

            match loader().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    metrics::record_loader_failure();

                    if retry >= self.config.max_retries {
                        tracing::warn!(key, attempts = retry + 1, error = %e, "Fetch failed");
                        return Err(FetchError::Loader(e));
                    }

                    let delay = self.config.delay_for_retry(retry);
                    tracing::debug!(
                        key,
                        retry = retry + 1,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
            }
        }
    }
}
