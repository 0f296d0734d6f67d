pub mod disk;
pub mod memory;

use crate::core::cache::RateCache;
use crate::core::config::{AppConfig, CacheBackend};
use anyhow::Result;
use disk::DiskRateCache;
use memory::MemoryRateCache;
use std::sync::Arc;
use tracing::debug;

/// Opens the cache backend selected in the config.
///
/// The disk backend lives under `cache.path`, or `<data dir>/cache` when
/// no path is set.
pub fn open_cache(config: &AppConfig) -> Result<Arc<dyn RateCache>> {
    match config.cache.backend {
        CacheBackend::Memory => {
            let capacity = config.cache.max_entries;
            debug!("Using in-memory rate cache with room for {} entries", capacity);
            Ok(Arc::new(MemoryRateCache::with_capacity(capacity)))
        }
        CacheBackend::Disk => {
            let path = match &config.cache.path {
                Some(path) => path.clone(),
                None => config.default_data_path()?.join("cache"),
            };
            debug!("Using disk rate cache at {}", path.display());
            Ok(Arc::new(DiskRateCache::open(&path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_disk_cache_from_config() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.cache.backend = CacheBackend::Disk;
        config.data_path = Some(dir.path().to_string_lossy().to_string());

        let cache = open_cache(&config).unwrap();
        cache
            .set("health_check", 1.0, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(cache.get("health_check").await.unwrap(), Some(1.0));
        assert!(dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_open_memory_cache_by_default() {
        let cache = open_cache(&AppConfig::default()).unwrap();
        assert_eq!(cache.get("health_check").await.unwrap(), None);
        assert_eq!(cache.stats().await.capacity, Some(1000));
    }

    #[tokio::test]
    async fn test_memory_cache_capacity_from_config() {
        let mut config = AppConfig::default();
        config.cache.max_entries = 2;

        let cache = open_cache(&config).unwrap();
        for key in ["a", "b", "c"] {
            cache.set(key, 1.0, Duration::from_secs(60)).await.unwrap();
        }
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.evictions, 1);
    }
}
