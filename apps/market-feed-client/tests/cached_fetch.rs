//! Cached Fetch Integration Tests
//!
//! TTL expiry, loader accounting, sliding-window limits, and retry timing for
//! `ResultCache`, `RateLimiter`, and `CachedFetcher` under a paused clock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use market_feed_client::{
    CacheConfig, CachedFetcher, FetchConfig, FetchError, RateLimitConfig, RateLimiter,
    ResultCache,
};
use tokio::time::Instant;

fn fetcher(max_requests: usize) -> CachedFetcher<String> {
    CachedFetcher::new(
        Arc::new(ResultCache::new(CacheConfig::default())),
        Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
        })),
        FetchConfig::default(),
    )
}

// =============================================================================
// ResultCache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn cache_entry_expires_after_ttl() {
    let cache = ResultCache::new(CacheConfig::default());

    cache.set("x", 1, Some(Duration::from_millis(100)));
    assert_eq!(cache.get("x"), Some(1));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get("x"), None);
}

#[tokio::test(start_paused = true)]
async fn get_or_load_calls_loader_once_per_miss() {
    let cache = ResultCache::new(CacheConfig::default());
    let calls = AtomicUsize::new(0);
    let load = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, anyhow::Error>("portfolio".to_string())
    };

    let first = cache
        .get_or_load("/api/portfolio", Some(Duration::from_secs(1)), load)
        .await
        .unwrap();
    let second = cache
        .get_or_load("/api/portfolio", Some(Duration::from_secs(1)), load)
        .await
        .unwrap();

    assert_eq!(first, "portfolio");
    assert_eq!(second, "portfolio");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    cache
        .get_or_load("/api/portfolio", Some(Duration::from_secs(1)), load)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn get_or_load_does_not_cache_failure() {
    let cache: ResultCache<String> = ResultCache::default();

    let result = cache
        .get_or_load("/api/quotes", None, || async {
            Err::<String, _>(anyhow::anyhow!("HTTP 503"))
        })
        .await;

    assert!(result.is_err());
    assert!(cache.is_empty());
}

// =============================================================================
// RateLimiter
// =============================================================================

#[tokio::test(start_paused = true)]
async fn limiter_admits_two_per_second() {
    let limiter = RateLimiter::new(RateLimitConfig {
        max_requests: 2,
        window: Duration::from_millis(1000),
    });

    assert!(limiter.try_acquire("k"));
    assert!(limiter.try_acquire("k"));
    assert!(!limiter.try_acquire("k"));
    assert_eq!(limiter.remaining("k"), 0);
    assert_eq!(limiter.reset_in("k"), Duration::from_millis(1000));

    tokio::time::sleep(Duration::from_millis(1000)).await;

    assert!(limiter.try_acquire("k"));
}

// =============================================================================
// CachedFetcher
// =============================================================================

#[tokio::test(start_paused = true)]
async fn cache_hit_skips_limiter_and_loader() {
    let fetcher = fetcher(10);
    let calls = AtomicUsize::new(0);
    let load = || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok("quotes".to_string())
    };

    fetcher.fetch("/api/quotes", load).await.unwrap();
    fetcher.fetch("/api/quotes", load).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.limiter().remaining("/api/quotes"), 9);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_retries_with_backoff() {
    let fetcher = fetcher(10);
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let value = fetcher
        .fetch("/api/portfolio", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("HTTP 502");
            }
            Ok("portfolio".to_string())
        })
        .await
        .unwrap();

    assert_eq!(value, "portfolio");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(3000));
    assert_eq!(fetcher.cache().get("/api/portfolio"), Some("portfolio".to_string()));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_last_error_uncached() {
    let fetcher = fetcher(10);
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let result = fetcher
        .fetch("/api/portfolio", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("HTTP 500 (attempt {n})"))
        })
        .await;

    match result {
        Err(FetchError::Loader(e)) => assert!(e.to_string().contains("attempt 3")),
        other => panic!("expected loader error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(start.elapsed(), Duration::from_millis(7000));
    assert!(fetcher.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_stops_fetch() {
    let fetcher = fetcher(1);

    fetcher
        .fetch("/api/news", || async { Ok("news".to_string()) })
        .await
        .unwrap();
    let result = fetcher
        .refetch("/api/news", || async { Ok("fresh news".to_string()) })
        .await;

    match result {
        Err(FetchError::RateLimited { key, retry_in }) => {
            assert_eq!(key, "/api/news");
            assert_eq!(retry_in, Duration::from_secs(60));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert!(fetcher.cache().get("/api/news").is_none());
}

#[tokio::test(start_paused = true)]
async fn rate_limit_applies_to_each_retry() {
    let fetcher = fetcher(2);
    let calls = AtomicUsize::new(0);

    let result = fetcher
        .fetch("/api/orders", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(anyhow::anyhow!("HTTP 500"))
        })
        .await;

    assert!(matches!(result, Err(FetchError::RateLimited { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
