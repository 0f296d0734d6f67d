//! Process-lifetime conversion statistics.
//!
//! Counters are atomics; the running latency mean is kept under a mutex
//! together with its sample count so each update sees a consistent pair.

use crate::core::asset::PairKind;
use crate::core::error::ErrorCategory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct ProviderCounters {
    calls: AtomicU64,
    failures: AtomicU64,
}

#[derive(Default)]
struct LatencyMean {
    samples: u64,
    mean_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionTypeTally {
    pub crypto_to_fiat: u64,
    pub fiat_to_crypto: u64,
    pub crypto_to_crypto: u64,
    pub fiat_to_fiat: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorTally {
    pub api_errors: u64,
    pub rate_limit_errors: u64,
    pub network_errors: u64,
    pub validation_errors: u64,
    pub unsupported_errors: u64,
}

/// Raw counters read at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_conversions: u64,
    pub successful_conversions: u64,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub fallback_uses: u64,
    pub avg_latency_ms: f64,
    pub api_call_breakdown: BTreeMap<String, u64>,
    pub api_failures: BTreeMap<String, u64>,
    pub conversion_types: ConversionTypeTally,
    pub error_breakdown: ErrorTally,
}

impl StatsSnapshot {
    pub fn success_rate(&self) -> f64 {
        ratio(self.successful_conversions, self.total_conversions)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.total_conversions)
    }

    /// Share of provider calls per provider, in percent.
    pub fn api_usage_distribution(&self) -> BTreeMap<String, f64> {
        let total: u64 = self.api_call_breakdown.values().sum();
        self.api_call_breakdown
            .iter()
            .map(|(name, calls)| (name.clone(), ratio(*calls, total) * 100.0))
            .collect()
    }
}

/// Supported asset counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetCoverage {
    pub crypto: usize,
    pub fiat: usize,
    pub total: usize,
}

/// Which provider roles have a credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApisConfigured {
    pub fiat: bool,
    pub crypto: bool,
}

/// Read-time view of the engine: raw counters, derived ratios and the
/// configuration they were recorded under.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub api_usage_distribution: BTreeMap<String, f64>,
    pub supported_assets: AssetCoverage,
    pub apis_configured: ApisConfigured,
}

impl PerformanceStats {
    pub fn new(
        counters: StatsSnapshot,
        supported_assets: AssetCoverage,
        apis_configured: ApisConfigured,
    ) -> Self {
        Self {
            success_rate: counters.success_rate(),
            cache_hit_rate: counters.cache_hit_rate(),
            api_usage_distribution: counters.api_usage_distribution(),
            counters,
            supported_assets,
            apis_configured,
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub struct Stats {
    total_conversions: AtomicU64,
    successful_conversions: AtomicU64,
    cache_hits: AtomicU64,
    api_calls: AtomicU64,
    fallback_uses: AtomicU64,
    providers: BTreeMap<&'static str, ProviderCounters>,
    conversion_types: [AtomicU64; 4],
    errors: [AtomicU64; 5],
    latency: Mutex<LatencyMean>,
}

fn kind_index(kind: PairKind) -> usize {
    match kind {
        PairKind::CryptoToFiat => 0,
        PairKind::FiatToCrypto => 1,
        PairKind::CryptoToCrypto => 2,
        PairKind::FiatToFiat => 3,
    }
}

fn category_index(category: ErrorCategory) -> usize {
    match category {
        ErrorCategory::Api => 0,
        ErrorCategory::RateLimit => 1,
        ErrorCategory::Network => 2,
        ErrorCategory::Validation => 3,
        ErrorCategory::Unsupported => 4,
    }
}

impl Stats {
    /// Creates zeroed statistics tracking the named providers.
    pub fn new(providers: &[&'static str]) -> Self {
        Self {
            total_conversions: AtomicU64::new(0),
            successful_conversions: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
            fallback_uses: AtomicU64::new(0),
            providers: providers
                .iter()
                .map(|name| (*name, ProviderCounters::default()))
                .collect(),
            conversion_types: Default::default(),
            errors: Default::default(),
            latency: Mutex::new(LatencyMean::default()),
        }
    }

    /// Counts an upstream call before it is made.
    pub fn record_attempt(&self, provider: &'static str, kind: PairKind) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.conversion_types[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
        if let Some(counters) = self.providers.get(provider) {
            counters.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_provider_failure(&self, provider: &'static str, category: ErrorCategory) {
        if let Some(counters) = self.providers.get(provider) {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.record_error(category);
    }

    pub fn record_error(&self, category: ErrorCategory) {
        self.errors[category_index(category)].fetch_add(1, Ordering::Relaxed);
    }

    /// Records the terminal outcome of one conversion.
    pub fn record_conversion(
        &self,
        success: bool,
        cached: bool,
        fallback: bool,
        latency: Duration,
    ) {
        self.total_conversions.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_conversions.fetch_add(1, Ordering::Relaxed);
        }
        if cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if fallback {
            self.fallback_uses.fetch_add(1, Ordering::Relaxed);
        }

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let mut mean = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        mean.samples += 1;
        mean.mean_ms = (mean.mean_ms * (mean.samples - 1) as f64 + latency_ms) / mean.samples as f64;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let avg_latency_ms = self
            .latency
            .lock()
            .map(|m| m.mean_ms)
            .unwrap_or_else(|e| e.into_inner().mean_ms);

        StatsSnapshot {
            total_conversions: load(&self.total_conversions),
            successful_conversions: load(&self.successful_conversions),
            cache_hits: load(&self.cache_hits),
            api_calls: load(&self.api_calls),
            fallback_uses: load(&self.fallback_uses),
            avg_latency_ms,
            api_call_breakdown: self
                .providers
                .iter()
                .map(|(name, c)| (name.to_string(), load(&c.calls)))
                .collect(),
            api_failures: self
                .providers
                .iter()
                .map(|(name, c)| (name.to_string(), load(&c.failures)))
                .collect(),
            conversion_types: ConversionTypeTally {
                crypto_to_fiat: load(&self.conversion_types[0]),
                fiat_to_crypto: load(&self.conversion_types[1]),
                crypto_to_crypto: load(&self.conversion_types[2]),
                fiat_to_fiat: load(&self.conversion_types[3]),
            },
            error_breakdown: ErrorTally {
                api_errors: load(&self.errors[0]),
                rate_limit_errors: load(&self.errors[1]),
                network_errors: load(&self.errors[2]),
                validation_errors: load(&self.errors[3]),
                unsupported_errors: load(&self.errors[4]),
            },
        }
    }

    pub fn reset(&self) {
        let counters = [
            &self.total_conversions,
            &self.successful_conversions,
            &self.cache_hits,
            &self.api_calls,
            &self.fallback_uses,
        ];
        for counter in counters
            .into_iter()
            .chain(self.conversion_types.iter())
            .chain(self.errors.iter())
        {
            counter.store(0, Ordering::Relaxed);
        }
        for counters in self.providers.values() {
            counters.calls.store(0, Ordering::Relaxed);
            counters.failures.store(0, Ordering::Relaxed);
        }
        let mut mean = self.latency.lock().unwrap_or_else(|e| e.into_inner());
        *mean = LatencyMean::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean_latency() {
        let stats = Stats::new(&["fiat"]);
        stats.record_conversion(true, false, false, Duration::from_millis(10));
        stats.record_conversion(true, false, false, Duration::from_millis(20));
        stats.record_conversion(false, false, false, Duration::from_millis(30));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_conversions, 3);
        assert_eq!(snapshot.successful_conversions, 2);
        assert!((snapshot.avg_latency_ms - 20.0).abs() < 1e-9);
        assert!((snapshot.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_attempts_and_failures() {
        let stats = Stats::new(&["fiat", "crypto"]);
        stats.record_attempt("fiat", PairKind::FiatToFiat);
        stats.record_attempt("crypto", PairKind::CryptoToFiat);
        stats.record_attempt("crypto", PairKind::CryptoToCrypto);
        stats.record_provider_failure("crypto", ErrorCategory::RateLimit);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.api_calls, 3);
        assert_eq!(snapshot.api_call_breakdown["fiat"], 1);
        assert_eq!(snapshot.api_call_breakdown["crypto"], 2);
        assert_eq!(snapshot.api_failures["crypto"], 1);
        assert_eq!(snapshot.conversion_types.fiat_to_fiat, 1);
        assert_eq!(snapshot.conversion_types.crypto_to_crypto, 1);
        assert_eq!(snapshot.error_breakdown.rate_limit_errors, 1);

        let distribution = snapshot.api_usage_distribution();
        assert!((distribution["crypto"] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = Stats::new(&["fiat"]);
        stats.record_attempt("fiat", PairKind::FiatToFiat);
        stats.record_error(ErrorCategory::Unsupported);
        stats.record_conversion(true, true, true, Duration::from_millis(5));

        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_conversions, 0);
        assert_eq!(snapshot.api_calls, 0);
        assert_eq!(snapshot.api_call_breakdown["fiat"], 0);
        assert_eq!(snapshot.error_breakdown, ErrorTally::default());
        assert_eq!(snapshot.avg_latency_ms, 0.0);
        assert_eq!(snapshot.success_rate(), 0.0);
    }

    #[test]
    fn test_performance_stats_derives_ratios() {
        let stats = Stats::new(&["fiat"]);
        stats.record_attempt("fiat", PairKind::FiatToFiat);
        stats.record_conversion(true, true, false, Duration::from_millis(2));
        stats.record_conversion(false, false, false, Duration::from_millis(2));

        let performance = PerformanceStats::new(
            stats.snapshot(),
            AssetCoverage {
                crypto: 2,
                fiat: 2,
                total: 4,
            },
            ApisConfigured {
                fiat: true,
                crypto: false,
            },
        );
        assert_eq!(performance.success_rate, 0.5);
        assert_eq!(performance.cache_hit_rate, 0.5);
        assert_eq!(performance.api_usage_distribution["fiat"], 100.0);

        let json = serde_json::to_value(&performance).unwrap();
        assert_eq!(json["total_conversions"], 2);
        assert_eq!(json["apis_configured"]["crypto"], false);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = std::sync::Arc::new(Stats::new(&["fiat"]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = std::sync::Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_attempt("fiat", PairKind::FiatToFiat);
                        stats.record_conversion(true, false, false, Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_conversions, 2000);
        assert_eq!(snapshot.api_calls, 2000);
        assert!((snapshot.avg_latency_ms - 1.0).abs() < 1e-6);
    }
}
