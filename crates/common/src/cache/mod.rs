//! Fetch cache and rate governor
//!
//! Provides:
//! - Memoization of successful provider lookups for the lifetime of a run
//! - Coalescing of concurrent requests for the same key
//! - Token-bucket pacing of every provider attempt
//! - Bounded exponential backoff for transient and quota failures

use crate::config::FetchConfig;
use crate::errors::{AppError, FetchError, ProviderError, Result};
use crate::metrics;
use crate::provider::MetadataProvider;
use crate::record::{LookupKey, RawRecord};
use backoff::{future::retry_notify, ExponentialBackoff, ExponentialBackoffBuilder};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Rate limiter using governor crate
pub type ProviderRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Records produced by one fetch (one for a lookup, any number for a search)
pub type Records = Arc<Vec<RawRecord>>;

/// Fetch cache configuration
#[derive(Debug, Clone)]
pub struct FetchCacheConfig {
    /// Sustained provider requests per second
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst: u32,
    /// Attempts for transient failures
    pub max_attempts: u32,
    /// Attempts for quota failures
    pub max_quota_attempts: u32,
    /// First backoff delay
    pub initial_backoff: Duration,
    /// Backoff ceiling
    pub max_backoff: Duration,
    /// Backoff growth factor
    pub multiplier: f64,
    /// Maximum memoized keys
    pub capacity: u64,
    /// Hits requested per search
    pub search_limit: usize,
}

impl Default for FetchCacheConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchCacheConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            requests_per_second: config.requests_per_second,
            burst: config.burst,
            max_attempts: config.max_attempts,
            max_quota_attempts: config.max_quota_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
            capacity: config.cache_capacity,
            search_limit: 1,
        }
    }
}

/// Counters describing fetch activity during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    pub provider_calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub retries: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    provider_calls: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

/// Create a new rate limiter
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Result<Arc<ProviderRateLimiter>> {
    let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
        message: "fetch.requests_per_second must be positive".to_string(),
    })?;
    let burst = NonZeroU32::new(burst).ok_or_else(|| AppError::Configuration {
        message: "fetch.burst must be positive".to_string(),
    })?;

    Ok(Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))))
}

/// Memoizing, paced, retrying front of a metadata provider
pub struct FetchCache {
    provider: Arc<dyn MetadataProvider>,
    limiter: Arc<ProviderRateLimiter>,
    cache: Cache<LookupKey, Records>,
    config: FetchCacheConfig,
    counters: Counters,
}

impl FetchCache {
    /// Create a new fetch cache in front of `provider`
    pub fn new(provider: Arc<dyn MetadataProvider>, config: FetchCacheConfig) -> Result<Self> {
        if config.max_attempts == 0 || config.max_quota_attempts == 0 {
            return Err(AppError::Configuration {
                message: "fetch attempt bounds must be at least 1".to_string(),
            });
        }
        let limiter = create_rate_limiter(config.requests_per_second, config.burst)?;
        let cache = Cache::builder().max_capacity(config.capacity).build();

        Ok(Self {
            provider,
            limiter,
            cache,
            config,
            counters: Counters::default(),
        })
    }

    /// Fetch the records for a key, from memory when already fetched.
    ///
    /// Only successes are memoized; a failed key is fetched again on the
    /// next call. Concurrent callers for one key share a single load, and
    /// only the caller whose load ran counts as a miss.
    #[instrument(skip(self, key), fields(provider = %self.provider.name(), key = %key))]
    pub async fn fetch(&self, key: &LookupKey) -> std::result::Result<Records, FetchError> {
        if let Some(hit) = self.cache.get(key).await {
            self.record_hit();
            return Ok(hit);
        }

        let loaded = AtomicBool::new(false);
        let result = self
            .cache
            .try_get_with(key.clone(), async {
                loaded.store(true, Ordering::Relaxed);
                self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache(false, "fetch");
                self.fetch_from_provider(key).await.map(Arc::new)
            })
            .await;

        let loaded = loaded.load(Ordering::Relaxed);
        match result {
            Ok(records) => {
                if !loaded {
                    self.record_hit();
                }
                Ok(records)
            }
            Err(err) => {
                if loaded {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                }
                Err((*err).clone())
            }
        }
    }

    fn record_hit(&self) {
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache(true, "fetch");
        debug!("Cache hit");
    }

    /// Whether a successful result for `key` is memoized
    pub fn contains(&self, key: &LookupKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Snapshot of the fetch counters
    pub fn stats(&self) -> FetchStats {
        FetchStats {
            provider_calls: self.counters.provider_calls.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_backoff)
            .with_max_interval(self.config.max_backoff)
            .with_multiplier(self.config.multiplier)
            .with_max_elapsed_time(None)
            .build()
    }

    fn attempt_limit(&self, err: &ProviderError) -> u32 {
        match err {
            ProviderError::Transient { .. } => self.config.max_attempts,
            ProviderError::QuotaExceeded { .. } => self.config.max_quota_attempts,
            ProviderError::NotFound { .. } | ProviderError::BadResponse { .. } => 1,
        }
    }

    async fn call(&self, key: &LookupKey) -> std::result::Result<Vec<RawRecord>, ProviderError> {
        match key {
            LookupKey::Id(id) => self.provider.lookup(id).await.map(|record| vec![record]),
            LookupKey::Query(query) => self.provider.search(query, self.config.search_limit).await,
        }
    }

    async fn fetch_from_provider(
        &self,
        key: &LookupKey,
    ) -> std::result::Result<Vec<RawRecord>, FetchError> {
        let attempts = AtomicU32::new(0);
        let attempts_ref = &attempts;
        let provider = self.provider.name().to_string();
        let provider_ref = provider.as_str();

        let operation = move || async move {
            let attempt = attempts_ref.fetch_add(1, Ordering::SeqCst) + 1;
            self.limiter.until_ready().await;

            let start = Instant::now();
            self.counters.provider_calls.fetch_add(1, Ordering::Relaxed);
            let result = self.call(key).await;
            let elapsed = start.elapsed().as_secs_f64();

            match result {
                Ok(records) => {
                    metrics::record_provider_request(elapsed, provider_ref, "ok");
                    Ok(records)
                }
                Err(err) => {
                    metrics::record_provider_request(elapsed, provider_ref, error_label(&err));
                    if attempt >= self.attempt_limit(&err) {
                        return Err(backoff::Error::permanent(err));
                    }
                    match err {
                        ProviderError::QuotaExceeded {
                            retry_after: Some(delay),
                        } => Err(backoff::Error::retry_after(err, delay)),
                        _ => Err(backoff::Error::transient(err)),
                    }
                }
            }
        };

        let notify = |err: ProviderError, delay: Duration| {
            self.counters.retries.fetch_add(1, Ordering::Relaxed);
            metrics::record_retry(provider_ref, error_label(&err));
            warn!(
                attempt = attempts_ref.load(Ordering::SeqCst),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Provider request failed, retrying"
            );
        };

        retry_notify(self.backoff(), operation, notify)
            .await
            .map_err(|err| FetchError::from_provider(&err, attempts.load(Ordering::SeqCst)))
    }
}

fn error_label(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::NotFound { .. } => "not_found",
        ProviderError::QuotaExceeded { .. } => "quota_exceeded",
        ProviderError::Transient { .. } => "transient",
        ProviderError::BadResponse { .. } => "bad_response",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FetchFailureKind;
    use crate::provider::StaticProvider;
    use crate::record::Identifier;

    fn fast_config() -> FetchCacheConfig {
        FetchCacheConfig {
            requests_per_second: 1_000,
            burst: 1_000,
            max_attempts: 3,
            max_quota_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
            capacity: 1_000,
            search_limit: 3,
        }
    }

    fn provider_with(id: &str, failures: Vec<ProviderError>) -> Arc<StaticProvider> {
        let raw = RawRecord {
            provider_id: Some(id.to_string()),
            title: Some("A paper".to_string()),
            ..Default::default()
        };
        Arc::new(
            StaticProvider::from_records([raw])
                .with_failures(Identifier::parse(id).unwrap(), failures),
        )
    }

    #[tokio::test]
    async fn test_memoizes_successful_lookups() {
        let provider = provider_with("W1", vec![]);
        let cache = FetchCache::new(provider.clone(), fast_config()).unwrap();
        let key = LookupKey::Id(Identifier::parse("W1").unwrap());

        let first = cache.fetch(&key).await.unwrap();
        let second = cache.fetch(&key).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(&key), 1);
        assert_eq!(cache.stats().cache_hits, 1);
        assert!(cache.contains(&key));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let transient = ProviderError::Transient { message: "503".into() };
        let provider = provider_with("W1", vec![transient.clone(), transient]);
        let cache = FetchCache::new(provider.clone(), fast_config()).unwrap();
        let key = LookupKey::Id(Identifier::parse("W1").unwrap());

        let records = cache.fetch(&key).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(provider.calls(&key), 3);
        assert_eq!(cache.stats().retries, 2);

        cache.fetch(&key).await.unwrap();
        assert_eq!(provider.calls(&key), 3);
    }

    #[tokio::test]
    async fn test_transient_exhaustion() {
        let transient = ProviderError::Transient { message: "503".into() };
        let provider = provider_with("W1", vec![transient; 5]);
        let cache = FetchCache::new(provider.clone(), fast_config()).unwrap();
        let key = LookupKey::Id(Identifier::parse("W1").unwrap());

        let err = cache.fetch(&key).await.unwrap_err();
        assert_eq!(err.kind, FetchFailureKind::Transient);
        assert_eq!(err.attempts, 3);
        assert!(!cache.contains(&key));
    }

    #[tokio::test]
    async fn test_quota_uses_its_own_bound() {
        let quota = ProviderError::QuotaExceeded {
            retry_after: Some(Duration::from_millis(1)),
        };
        let provider = provider_with("W1", vec![quota; 10]);
        let cache = FetchCache::new(provider.clone(), fast_config()).unwrap();
        let key = LookupKey::Id(Identifier::parse("W1").unwrap());

        let err = cache.fetch(&key).await.unwrap_err();
        assert_eq!(err.kind, FetchFailureKind::QuotaExceeded);
        assert_eq!(provider.calls(&key), 4);
    }

    #[tokio::test]
    async fn test_bad_response_not_retried() {
        let bad = ProviderError::BadResponse { message: "truncated".into() };
        let provider = provider_with("W1", vec![bad]);
        let cache = FetchCache::new(provider.clone(), fast_config()).unwrap();
        let key = LookupKey::Id(Identifier::parse("W1").unwrap());

        let err = cache.fetch(&key).await.unwrap_err();
        assert_eq!(err.kind, FetchFailureKind::BadResponse);
        assert_eq!(provider.calls(&key), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let provider = provider_with("W1", vec![]);
        let cache = FetchCache::new(provider.clone(), fast_config()).unwrap();
        let key = LookupKey::Id(Identifier::parse("W1").unwrap());

        let (a, b) = tokio::join!(cache.fetch(&key), cache.fetch(&key));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(provider.calls(&key), 1);
    }

    #[tokio::test]
    async fn test_coalesced_waiters_not_counted_as_misses() {
        let raw = RawRecord {
            provider_id: Some("W1".to_string()),
            title: Some("A paper".to_string()),
            ..Default::default()
        };
        let provider = Arc::new(StaticProvider::from_records([raw]).with_delay(Duration::from_millis(20)));
        let cache = FetchCache::new(provider.clone(), fast_config()).unwrap();
        let key = LookupKey::Id(Identifier::parse("W1").unwrap());

        let (a, b, c) = tokio::join!(cache.fetch(&key), cache.fetch(&key), cache.fetch(&key));
        assert!(a.is_ok() && b.is_ok() && c.is_ok());

        let stats = cache.stats();
        assert_eq!(stats.provider_calls, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 2);
    }

    #[test]
    fn test_rate_limiter_rejects_zero() {
        assert!(create_rate_limiter(0, 1).is_err());
        let limiter = create_rate_limiter(100, 200).unwrap();
        assert!(limiter.check().is_ok());
    }
}
