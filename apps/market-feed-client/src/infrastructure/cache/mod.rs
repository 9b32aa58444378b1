//! Result Cache
//!
//! Keyed TTL cache that collapses duplicate requests. An entry is fresh while
//! `now - stored_at <= ttl`; a `None` TTL never expires. Stale entries are
//! evicted when read.
//!
//! [`ResultCache::get_or_load`] is single-flight per key: concurrent misses
//! wait for the first loader instead of each calling their own. Failed loads
//! are never stored, so a waiter whose leader failed runs its own loader.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::infrastructure::metrics;

/// Default time-to-live for [`ResultCache::set_default`] (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied by `set_default`.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl From<&crate::CacheSettings> for CacheConfig {
    fn from(settings: &crate::CacheSettings) -> Self {
        Self {
            default_ttl: settings.ttl,
        }
    }
}

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.ttl
            .is_none_or(|ttl| now.duration_since(self.stored_at) <= ttl)
    }
}

/// In-memory TTL cache with single-flight loading.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use market_feed_client::infrastructure::cache::ResultCache;
///
/// let cache = ResultCache::new(Default::default());
/// cache.set("portfolio", 42_u32, Some(Duration::from_secs(30)));
/// assert_eq!(cache.get("portfolio"), Some(42));
/// ```
pub struct ResultCache<V> {
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    /// One async gate per key with a load in flight.
    loads: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<V> std::fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.config)
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<V> ResultCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// The configured default TTL.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.lock().insert(key.into(), entry);
    }

    /// Store `value` under `key` with the default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, Some(self.config.default_ttl));
    }

    /// Store several entries with the same TTL.
    pub fn set_many<K, I>(&self, items: I, ttl: Option<Duration>)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let stored_at = Instant::now();
        let mut entries = self.entries.lock();
        for (key, value) in items {
            entries.insert(
                key.into(),
                CacheEntry {
                    value,
                    stored_at,
                    ttl,
                },
            );
        }
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Drop the entries for `keys`. Returns how many existed.
    pub fn remove_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> usize {
        let mut entries = self.entries.lock();
        keys.into_iter()
            .filter(|key| entries.remove(*key).is_some())
            .count()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Stored entries, including stale ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn lease_gate<'a>(&'a self, key: &'a str) -> GateLease<'a, V> {
        let gate = Arc::clone(self.loads.lock().entry(key.to_owned()).or_default());
        GateLease {
            cache: self,
            key,
            gate: Some(gate),
        }
    }

    fn release_gate(&self, key: &str) {
        let mut loads = self.loads.lock();
        if loads.get(key).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            loads.remove(key);
        }
    }
}

/// A caller's share of a key's load gate. Dropping it removes the gate from
/// `loads` once no other caller holds it, whether the load finished, failed,
/// panicked, or was cancelled.
struct GateLease<'a, V> {
    cache: &'a ResultCache<V>,
    key: &'a str,
    gate: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl<V> GateLease<'_, V> {
    async fn lock(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }
}

impl<V> Drop for GateLease<'_, V> {
    fn drop(&mut self) {
        self.gate.take();
        self.cache.release_gate(self.key);
    }
}

impl<V: Clone> ResultCache<V> {
    /// Fresh value for `key`, if any. A stale entry is evicted.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.lookup(key);
        metrics::record_cache_lookup(value.is_some());
        value
    }

    /// Fresh values for each of `keys`, in order.
    #[must_use]
    pub fn get_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<Option<V>> {
        keys.into_iter().map(|key| self.get(key)).collect()
    }

    /// Return the cached value for `key`, or run `loader` and cache its
    /// result under `ttl`.
    ///
    /// A hit never calls `loader`.
    ///
    /// # Errors
    ///
    /// Returns the loader's error unchanged. Errors are not cached.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let lease = self.lease_gate(key);
        let _in_flight = lease.lock().await;

        // Another caller may have loaded it while we waited.
        if let Some(value) = self.lookup(key) {
            tracing::trace!(key, "Cache filled by concurrent load");
            return Ok(value);
        }

        tracing::debug!(key, "Cache miss, loading");
        loader().await.inspect(|value| self.set(key, value.clone(), ttl))
    }

    fn lookup(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_fresh(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}
