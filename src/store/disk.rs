use crate::core::cache::{CacheStats, RateCache};
use anyhow::{Context, Result};
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const RATES_PARTITION: &str = "rates";

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    rate: f64,
    expires_at: SystemTime,
}

/// Rate cache persisted in a fjall keyspace, so last known rates survive
/// restarts. Entries are only dropped once expired.
pub struct DiskRateCache {
    keyspace: Keyspace,
    partition: PartitionHandle,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskRateCache {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create cache directory: {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open cache at {}", path.display()))?;
        let partition = keyspace
            .open_partition(RATES_PARTITION, PartitionCreateOptions::default())
            .context("Failed to open rates partition")?;
        Ok(Self {
            keyspace,
            partition,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn read(&self, key: &str) -> Result<Option<f64>> {
        let Some(bytes) = self.partition.get(key)? else {
            debug!("Cache MISS for key: {}", key);
            return Ok(None);
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Dropping unreadable cache entry {}: {}", key, e);
                self.remove(key)?;
                return Ok(None);
            }
        };

        if SystemTime::now() >= entry.expires_at {
            debug!("Cache entry expired for key: {}", key);
            self.remove(key)?;
            return Ok(None);
        }
        debug!("Cache HIT for key: {}", key);
        Ok(Some(entry.rate))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.partition.remove(key)?;
        debug!("Cache REMOVE for key: {}", key);
        Ok(())
    }
}

impl Drop for DiskRateCache {
    fn drop(&mut self) {
        if let Err(e) = self.keyspace.persist(PersistMode::SyncAll) {
            warn!("Failed to persist rate cache: {}", e);
        }
    }
}

#[async_trait]
impl RateCache for DiskRateCache {
    async fn get(&self, key: &str) -> Result<Option<f64>> {
        let rate = self.read(key)?;
        let counter = if rate.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(rate)
    }

    async fn set(&self, key: &str, rate: f64, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            rate,
            expires_at: SystemTime::now() + ttl,
        };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        debug!("Cache PUT for key: {}", key);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.partition.approximate_len(),
            capacity: None,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_disk_cache_get_set() {
        let dir = tempdir().unwrap();
        let cache = DiskRateCache::open(dir.path()).unwrap();

        assert_eq!(cache.get("direct:BTC:USD").await.unwrap(), None);

        cache
            .set("direct:BTC:USD", 50_000.0, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("direct:BTC:USD").await.unwrap(), Some(50_000.0));
        assert_eq!(cache.get("direct:BTC:EUR").await.unwrap(), None);

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 2));
        assert_eq!(stats.capacity, None);
    }

    #[tokio::test]
    async fn test_disk_cache_ttl_expiration() {
        let dir = tempdir().unwrap();
        let cache = DiskRateCache::open(dir.path()).unwrap();

        cache
            .set("rate:ETH:USD", 3000.0, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(cache.get("rate:ETH:USD").await.unwrap(), Some(3000.0));

        sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("rate:ETH:USD").await.unwrap(), None);
        assert!(cache.partition.get("rate:ETH:USD").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disk_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskRateCache::open(dir.path()).unwrap();
            cache
                .set("fallback:BTC:USD", 48_000.0, Duration::from_secs(3600))
                .await
                .unwrap();
        }

        let cache = DiskRateCache::open(dir.path()).unwrap();
        assert_eq!(
            cache.get("fallback:BTC:USD").await.unwrap(),
            Some(48_000.0)
        );
    }

    #[tokio::test]
    async fn test_disk_cache_remove() {
        let dir = tempdir().unwrap();
        let cache = DiskRateCache::open(dir.path()).unwrap();

        cache
            .set("direct:USD:EUR", 0.92, Duration::from_secs(60))
            .await
            .unwrap();
        cache.remove("direct:USD:EUR").unwrap();
        assert_eq!(cache.get("direct:USD:EUR").await.unwrap(), None);
    }
}
