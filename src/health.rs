//! Self-check of the cache, providers and a fixed set of conversions.

use crate::core::cache::{CacheKey, CacheStats};
use crate::core::conversion::ConversionResult;
use crate::core::metrics::PerformanceStats;
use crate::router::ConversionRouter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

const PROBE_RATE: f64 = 1.0;
const PROBE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHealth {
    pub operational: bool,
    pub error: Option<String>,
    pub stats: CacheStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub role: &'static str,
    pub name: Option<&'static str>,
    pub configured: bool,
    pub supports: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCoverage {
    pub crypto_assets: usize,
    pub fiat_assets: usize,
    pub pivot_currencies: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub issues: Vec<String>,
    pub cache: CacheHealth,
    pub providers: Vec<ProviderHealth>,
    pub performance: PerformanceStats,
    pub asset_coverage: HealthCoverage,
    pub test_conversions: Vec<ConversionResult>,
}

async fn probe_cache(router: &ConversionRouter) -> CacheHealth {
    let key = CacheKey::Probe.to_string();
    let cache = router.cache();
    let outcome = match cache.set(&key, PROBE_RATE, PROBE_TTL).await {
        Ok(()) => cache.get(&key).await,
        Err(e) => Err(e),
    };
    let error = match outcome {
        Ok(Some(rate)) if rate == PROBE_RATE => None,
        Ok(other) => Some(format!("probe read back {other:?}")),
        Err(e) => Some(format!("{e:#}")),
    };
    CacheHealth {
        operational: error.is_none(),
        error,
        stats: cache.stats().await,
    }
}

pub async fn health_check(router: &ConversionRouter) -> HealthReport {
    let mut issues = Vec::new();

    let cache = probe_cache(router).await;
    if !cache.operational {
        warn!("Cache probe failed: {:?}", cache.error);
        issues.push("Cache not responding".to_string());
    }

    let providers = vec![
        ProviderHealth {
            role: "fiat",
            name: router.fiat_provider_name(),
            configured: router.apis_configured().fiat,
            supports: "fiat-to-fiat conversions",
        },
        ProviderHealth {
            role: "crypto",
            name: router.crypto_provider_name(),
            configured: router.apis_configured().crypto,
            supports: "conversions involving crypto assets",
        },
    ];

    let performance = router.get_performance_stats();
    let asset_coverage = HealthCoverage {
        crypto_assets: router.catalog().crypto_count(),
        fiat_assets: router.catalog().fiat_count(),
        pivot_currencies: router.settings().pivots.len(),
    };

    let mut test_conversions = Vec::new();
    for (base, quote) in &router.settings().health_pairs {
        let result = router.convert(base, quote, 1.0).await;
        if !result.is_success() {
            issues.push(format!("Test conversion {} failed", result.pair));
        }
        test_conversions.push(result);
    }

    let status = if issues.is_empty() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };
    info!("Health check finished: {:?} with {} issues", status, issues.len());

    HealthReport {
        status,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        issues,
        cache,
        providers,
        performance,
        asset_coverage,
        test_conversions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::RateCache;
    use crate::core::estimates::EstimatedRateTable;
    use crate::router::tests::{MockProvider, small_catalog};
    use crate::store::memory::MemoryRateCache;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct BrokenCache;

    #[async_trait]
    impl RateCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<f64>> {
            Err(anyhow!("connection refused"))
        }

        async fn set(&self, _key: &str, _rate: f64, _ttl: Duration) -> Result<()> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_healthy_report() {
        let router = ConversionRouter::new(small_catalog(), Arc::new(MemoryRateCache::new()))
            .with_crypto_provider(Arc::new(MockProvider::new(
                "crypto",
                &[("BTC/USD", 50_000.0), ("ETH/ADA", 5000.0)],
            )))
            .with_fiat_provider(Arc::new(MockProvider::new("fiat", &[("USD/EUR", 0.9)])));

        let report = health_check(&router).await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
        assert!(report.cache.operational);
        assert_eq!(report.cache.stats.capacity, Some(1000));
        assert!(report.cache.stats.hits >= 1);
        assert_eq!(report.test_conversions.len(), 3);
        assert!(report.providers.iter().all(|p| p.configured));
        assert_eq!(report.asset_coverage.pivot_currencies, 4);
        assert_eq!(report.version, env!("CARGO_PKG_VERSION"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["cache"]["stats"]["evictions"], 0);
    }

    #[tokio::test]
    async fn test_broken_cache_and_failed_conversions_degrade() {
        let router = ConversionRouter::new(small_catalog(), Arc::new(BrokenCache))
            .with_estimates(EstimatedRateTable::empty());

        let report = health_check(&router).await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.cache.operational);
        assert!(report.cache.error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(report.cache.stats, CacheStats::default());
        // One cache issue plus three failed test conversions.
        assert_eq!(report.issues.len(), 4);
        assert!(report.providers.iter().all(|p| !p.configured));
    }
}
