use crate::core::cache::{CacheStats, RateCache};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 1000;

struct CachedRate {
    rate: f64,
    /// Write order, used to find the oldest entry.
    seq: u64,
    expires_at: Instant,
}

impl CachedRate {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Process-local rate cache holding at most `capacity` entries.
///
/// A write into a full cache first drops expired entries, then the oldest
/// stored one.
pub struct MemoryRateCache {
    inner: Mutex<HashMap<String, CachedRate>>,
    capacity: usize,
    writes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for MemoryRateCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryRateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            writes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn make_room(&self, cache: &mut HashMap<String, CachedRate>, now: Instant) {
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_expired(now));
        let mut evicted = before - cache.len();

        while cache.len() >= self.capacity {
            let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            cache.remove(&oldest);
            debug!("Cache EVICT for key: {}", oldest);
            evicted += 1;
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl RateCache for MemoryRateCache {
    async fn get(&self, key: &str) -> Result<Option<f64>> {
        let mut cache = self.inner.lock().await;
        let rate = match cache.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                debug!("Cache entry expired for key: {}", key);
                cache.remove(key);
                None
            }
            Some(entry) => {
                debug!("Cache HIT for key: {}", key);
                Some(entry.rate)
            }
            None => {
                debug!("Cache MISS for key: {}", key);
                None
            }
        };
        let counter = if rate.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(rate)
    }

    async fn set(&self, key: &str, rate: f64, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut cache = self.inner.lock().await;
        if !cache.contains_key(key) && cache.len() >= self.capacity {
            self.make_room(&mut cache, now);
        }
        let entry = CachedRate {
            rate,
            seq: self.writes.fetch_add(1, Ordering::Relaxed),
            expires_at: now + ttl,
        };
        cache.insert(key.to_string(), entry);
        debug!("Cache PUT for key: {}", key);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.lock().await.len(),
            capacity: Some(self.capacity),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const BRIEF: Duration = Duration::from_millis(10);
    const MINUTE: Duration = Duration::from_secs(60);
    const HOUR: Duration = Duration::from_secs(3600);

    async fn put(cache: &MemoryRateCache, key: &str, rate: f64, ttl: Duration) {
        cache.set(key, rate, ttl).await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_get_set() {
        let cache = MemoryRateCache::new();

        assert_eq!(cache.get("direct:BTC:USD").await.unwrap(), None);

        put(&cache, "direct:BTC:USD", 50_000.0, MINUTE).await;

        assert_eq!(cache.get("direct:BTC:USD").await.unwrap(), Some(50_000.0));
        assert_eq!(cache.get("direct:USD:BTC").await.unwrap(), None);

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 2));
        assert_eq!(stats.capacity, Some(DEFAULT_CAPACITY));
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_get() {
        let cache = MemoryRateCache::new();

        put(&cache, "rate:ETH:USD", 3000.0, BRIEF).await;
        assert_eq!(cache.get("rate:ETH:USD").await.unwrap(), Some(3000.0));

        sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("rate:ETH:USD").await.unwrap(), None);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_refreshes_expiry() {
        let cache = MemoryRateCache::new();

        put(&cache, "direct:USD:EUR", 0.9, BRIEF).await;
        put(&cache, "direct:USD:EUR", 0.95, MINUTE).await;

        sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("direct:USD:EUR").await.unwrap(), Some(0.95));
    }

    #[tokio::test]
    async fn test_many_distinct_keys_stay_within_capacity() {
        let cache = MemoryRateCache::new();

        for i in 0..5000 {
            let key = format!("estimate:A{i}:B");
            put(&cache, &key, i as f64, HOUR).await;
        }

        let stats = cache.stats().await;
        assert_eq!(stats.entries, DEFAULT_CAPACITY);
        assert_eq!(stats.evictions, 4000);
        assert_eq!(cache.get("estimate:A0:B").await.unwrap(), None);
        assert_eq!(cache.get("estimate:A4999:B").await.unwrap(), Some(4999.0));
    }

    #[tokio::test]
    async fn test_full_cache_drops_expired_before_oldest() {
        let cache = MemoryRateCache::with_capacity(3);

        put(&cache, "oldest", 1.0, MINUTE).await;
        put(&cache, "short", 2.0, BRIEF).await;
        put(&cache, "newer", 3.0, MINUTE).await;
        sleep(Duration::from_millis(20)).await;

        put(&cache, "fourth", 4.0, MINUTE).await;
        assert_eq!(cache.get("oldest").await.unwrap(), Some(1.0));
        assert_eq!(cache.get("short").await.unwrap(), None);

        put(&cache, "fifth", 5.0, MINUTE).await;
        assert_eq!(cache.get("oldest").await.unwrap(), None);
        assert_eq!(cache.get("newer").await.unwrap(), Some(3.0));

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.evictions, 2);
    }

    #[tokio::test]
    async fn test_overwrite_in_full_cache_evicts_nothing() {
        let cache = MemoryRateCache::with_capacity(2);

        put(&cache, "a", 1.0, MINUTE).await;
        put(&cache, "b", 2.0, MINUTE).await;
        put(&cache, "a", 1.5, MINUTE).await;

        assert_eq!(cache.get("b").await.unwrap(), Some(2.0));
        assert_eq!(cache.stats().await.evictions, 0);
    }
}
