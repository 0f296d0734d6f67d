//! Multi-strategy conversion routing.
//!
//! A conversion tries, in order: a direct rate, a bridge through one
//! pivot asset, a bridge through two pivots (crypto pairs only), and
//! finally the last known or estimated rate. Provider failures never
//! escape `convert`; they only move the request on to the next strategy.

use crate::core::asset::{AssetCatalog, PairKind};
use crate::core::cache::{CacheKey, CacheTtl, RateCache};
use crate::core::config::AppConfig;
use crate::core::conversion::{
    BridgeLeg, ConversionMethod, ConversionRequest, ConversionResult, confidence,
};
use crate::core::error::{ErrorCategory, ProviderError};
use crate::core::estimates::EstimatedRateTable;
use crate::core::metrics::{ApisConfigured, AssetCoverage, PerformanceStats, Stats};
use crate::core::provider::RateProvider;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

const ESTIMATE_NOTE: &str = "Estimated rate; live providers unavailable";

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingSettings {
    pub pivots: Vec<String>,
    pub double_pivots: Vec<(String, String)>,
    pub health_pairs: Vec<(String, String)>,
    pub ttl: CacheTtl,
    /// Upper bound on a single provider call.
    pub provider_timeout: Duration,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RoutingSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let upper_pairs = |pairs: &[[String; 2]]| -> Vec<(String, String)> {
            pairs
                .iter()
                .map(|[a, b]| (a.to_uppercase(), b.to_uppercase()))
                .collect()
        };
        Self {
            pivots: config
                .routing
                .pivots
                .iter()
                .map(|p| p.to_uppercase())
                .collect(),
            double_pivots: upper_pairs(&config.routing.double_pivots),
            health_pairs: upper_pairs(&config.routing.health_pairs),
            ttl: config.cache.ttl.clone(),
            provider_timeout: Duration::from_secs(config.providers.timeout_secs),
        }
    }
}

fn direct_method(kind: PairKind) -> ConversionMethod {
    if kind == PairKind::FiatToFiat {
        ConversionMethod::FxDirect
    } else {
        ConversionMethod::Direct
    }
}

/// Intermediate assets of a bridged conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PivotPath<'a> {
    Single(&'a str),
    Double(&'a str, &'a str),
}

impl<'a> PivotPath<'a> {
    fn via(&self) -> String {
        match self {
            PivotPath::Single(pivot) => pivot.to_string(),
            PivotPath::Double(first, second) => format!("{first}+{second}"),
        }
    }

    /// The `(from, to)` legs from the request base to its quote.
    fn hops<'r>(&self, request: &'r ConversionRequest) -> Vec<(&'r str, &'r str)>
    where
        'a: 'r,
    {
        let (base, quote) = (request.base.as_str(), request.quote.as_str());
        match *self {
            PivotPath::Single(pivot) => vec![(base, pivot), (pivot, quote)],
            PivotPath::Double(first, second) => {
                vec![(base, first), (first, second), (second, quote)]
            }
        }
    }

    fn result(
        &self,
        request: &ConversionRequest,
        rate: f64,
        legs: Vec<BridgeLeg>,
    ) -> ConversionResult {
        let (method, score) = match *self {
            PivotPath::Single(pivot) => (
                ConversionMethod::Bridge {
                    pivot: pivot.to_string(),
                },
                confidence::SINGLE_BRIDGE,
            ),
            PivotPath::Double(first, second) => (
                ConversionMethod::DoubleBridge {
                    first: first.to_string(),
                    second: second.to_string(),
                },
                confidence::DOUBLE_BRIDGE,
            ),
        };
        ConversionResult::success(request.pair(), method, rate, request.amount, score)
            .with_legs(legs)
    }
}

pub struct ConversionRouter {
    catalog: Arc<AssetCatalog>,
    cache: Arc<dyn RateCache>,
    fiat_provider: Option<Arc<dyn RateProvider>>,
    crypto_provider: Option<Arc<dyn RateProvider>>,
    estimates: RwLock<Arc<EstimatedRateTable>>,
    settings: RoutingSettings,
    stats: Stats,
}

impl ConversionRouter {
    pub fn new(catalog: Arc<AssetCatalog>, cache: Arc<dyn RateCache>) -> Self {
        Self {
            catalog,
            cache,
            fiat_provider: None,
            crypto_provider: None,
            estimates: RwLock::new(Arc::new(EstimatedRateTable::builtin())),
            settings: RoutingSettings::default(),
            stats: Stats::new(&[]),
        }
    }

    /// Provider for fiat-to-fiat pairs.
    pub fn with_fiat_provider(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.fiat_provider = Some(provider);
        self.stats = self.fresh_stats();
        self
    }

    /// Provider for every pair that involves a crypto asset.
    pub fn with_crypto_provider(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.crypto_provider = Some(provider);
        self.stats = self.fresh_stats();
        self
    }

    pub fn with_estimates(self, table: EstimatedRateTable) -> Self {
        self.replace_estimates(table);
        self
    }

    pub fn with_settings(mut self, settings: RoutingSettings) -> Self {
        self.settings = settings;
        self
    }

    fn fresh_stats(&self) -> Stats {
        let names: Vec<&'static str> = [&self.fiat_provider, &self.crypto_provider]
            .into_iter()
            .flatten()
            .map(|provider| provider.name())
            .collect();
        Stats::new(&names)
    }

    /// Swaps the estimated-rate table used by the last-resort strategy.
    pub fn replace_estimates(&self, table: EstimatedRateTable) {
        let mut estimates = self.estimates.write().unwrap_or_else(|e| e.into_inner());
        *estimates = Arc::new(table);
        debug!("Replaced estimated rate table");
    }

    fn estimates(&self) -> Arc<EstimatedRateTable> {
        let estimates = self.estimates.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&estimates)
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &RoutingSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<dyn RateCache> {
        &self.cache
    }

    pub fn fiat_provider_name(&self) -> Option<&'static str> {
        self.fiat_provider.as_ref().map(|p| p.name())
    }

    pub fn crypto_provider_name(&self) -> Option<&'static str> {
        self.crypto_provider.as_ref().map(|p| p.name())
    }

    pub fn apis_configured(&self) -> ApisConfigured {
        ApisConfigured {
            fiat: self.fiat_provider.is_some(),
            crypto: self.crypto_provider.is_some(),
        }
    }

    pub fn get_performance_stats(&self) -> PerformanceStats {
        let crypto = self.catalog.crypto_count();
        let fiat = self.catalog.fiat_count();
        PerformanceStats::new(
            self.stats.snapshot(),
            AssetCoverage {
                crypto,
                fiat,
                total: crypto + fiat,
            },
            self.apis_configured(),
        )
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
        info!("Conversion statistics reset");
    }

    /// Converts `amount` of `base` into `quote`.
    ///
    /// Always returns a result; failures carry `rate: None` and an error
    /// message. Statistics are updated once per call.
    #[instrument(skip(self, amount), fields(pair = %format!("{base}/{quote}")))]
    pub async fn convert(&self, base: &str, quote: &str, amount: f64) -> ConversionResult {
        let started = Instant::now();
        let result = self.route(base, quote, amount).await;
        let result = result.with_latency(started.elapsed());

        self.stats.record_conversion(
            result.is_success(),
            result.cached,
            result.is_success() && result.method.is_fallback(),
            result.latency,
        );

        match (result.rate, &result.error) {
            (Some(rate), _) => info!(
                "Converted {} via {} at {} (confidence {:.1}, cached: {})",
                result.pair, result.method, rate, result.confidence, result.cached
            ),
            (None, error) => info!(
                "Conversion failed for {}: {}",
                result.pair,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
        result
    }

    async fn route(&self, base: &str, quote: &str, amount: f64) -> ConversionResult {
        let request = match ConversionRequest::new(base, quote, amount) {
            Ok(request) => request,
            Err(e) => {
                self.stats.record_error(ErrorCategory::Validation);
                let pair = format!(
                    "{}/{}",
                    base.trim().to_uppercase(),
                    quote.trim().to_uppercase()
                );
                return ConversionResult::failure(pair, ConversionMethod::Direct, e.to_string());
            }
        };
        let pair = request.pair();

        if request.base == request.quote {
            return ConversionResult::success(
                pair,
                ConversionMethod::Direct,
                1.0,
                request.amount,
                confidence::DIRECT,
            );
        }

        for symbol in [&request.base, &request.quote] {
            if !self.catalog.contains(symbol) {
                self.stats.record_error(ErrorCategory::Unsupported);
                return ConversionResult::failure(
                    pair,
                    ConversionMethod::Direct,
                    format!("Unsupported asset: {symbol}"),
                );
            }
        }

        // Both symbols are in the catalog, so the pair always classifies.
        let Some(kind) = self.catalog.classify(&request.base, &request.quote) else {
            return ConversionResult::failure(
                pair,
                ConversionMethod::Direct,
                format!("Unsupported pair: {}", request.pair()),
            );
        };

        if let Some(result) = self.cached_direct(&request, kind).await {
            return result;
        }
        if let Some(result) = self.cached_bridge(&request, kind).await {
            return result;
        }

        let mut last_error = None;
        if let Some(result) = self.try_direct(&request, kind, &mut last_error).await {
            return result;
        }
        if let Some(result) = self.try_bridges(&request, kind, &mut last_error).await {
            return result;
        }
        self.try_fallback(&request, kind, last_error).await
    }

    async fn cached_direct(
        &self,
        request: &ConversionRequest,
        kind: PairKind,
    ) -> Option<ConversionResult> {
        let key = CacheKey::Direct {
            base: &request.base,
            quote: &request.quote,
        }
        .to_string();
        let rate = self.cache_get(&key).await?;
        Some(
            ConversionResult::success(
                request.pair(),
                direct_method(kind),
                rate,
                request.amount,
                confidence::DIRECT,
            )
            .from_cache(),
        )
    }

    /// A bridge found earlier for this pair, served while it and its legs
    /// are still cached.
    async fn cached_bridge(
        &self,
        request: &ConversionRequest,
        kind: PairKind,
    ) -> Option<ConversionResult> {
        for path in self.pivot_paths(request, kind) {
            let via = path.via();
            let key = CacheKey::Bridge {
                base: &request.base,
                quote: &request.quote,
                via: &via,
            }
            .to_string();
            let Some(rate) = self.cache_get(&key).await else {
                continue;
            };

            let hops = path.hops(request);
            let mut legs = Vec::new();
            for &(from, to) in &hops {
                let leg_key = CacheKey::Leg { from, to }.to_string();
                match self.cache_get(&leg_key).await {
                    Some(leg) => legs.push(BridgeLeg::new(from, to, leg)),
                    None => break,
                }
            }
            if legs.len() != hops.len() {
                debug!("Cached bridge {} lost a leg, routing again", key);
                continue;
            }

            debug!("Serving {} from cached bridge via {}", request.pair(), via);
            return Some(path.result(request, rate, legs).from_cache());
        }
        None
    }

    async fn try_direct(
        &self,
        request: &ConversionRequest,
        kind: PairKind,
        last_error: &mut Option<ProviderError>,
    ) -> Option<ConversionResult> {
        debug!("Trying direct rate for {}", request.pair());
        let rate = self
            .fetch(&request.base, &request.quote, kind, last_error)
            .await?;
        let key = CacheKey::Direct {
            base: &request.base,
            quote: &request.quote,
        }
        .to_string();
        self.cache_set(&key, rate, self.settings.ttl.live(Some(kind)))
            .await;
        self.remember_live(request, rate).await;
        Some(ConversionResult::success(
            request.pair(),
            direct_method(kind),
            rate,
            request.amount,
            confidence::DIRECT,
        ))
    }

    /// Pivot paths in the order they are tried: every single pivot, then
    /// pivot pairs for crypto-to-crypto requests only. Paths through the
    /// requested assets themselves are skipped.
    fn pivot_paths<'a>(
        &'a self,
        request: &ConversionRequest,
        kind: PairKind,
    ) -> Vec<PivotPath<'a>> {
        let touches = |pivot: &str| pivot == request.base || pivot == request.quote;

        let singles = self
            .settings
            .pivots
            .iter()
            .filter(|pivot| !touches(pivot.as_str()))
            .map(|pivot| PivotPath::Single(pivot.as_str()));
        let doubles = self
            .settings
            .double_pivots
            .iter()
            .filter(|_| kind == PairKind::CryptoToCrypto)
            .filter(|(first, second)| {
                first != second && !touches(first.as_str()) && !touches(second.as_str())
            })
            .map(|(first, second)| PivotPath::Double(first.as_str(), second.as_str()));

        singles.chain(doubles).collect()
    }

    async fn try_bridges(
        &self,
        request: &ConversionRequest,
        kind: PairKind,
        last_error: &mut Option<ProviderError>,
    ) -> Option<ConversionResult> {
        'paths: for path in self.pivot_paths(request, kind) {
            debug!("Trying {} via {}", request.pair(), path.via());
            let mut legs = Vec::new();
            for (from, to) in path.hops(request) {
                let Some(rate) = self.leg_rate(from, to, last_error).await else {
                    continue 'paths;
                };
                legs.push(BridgeLeg::new(from, to, rate));
            }

            let rate: f64 = legs.iter().map(|leg| leg.rate).product();
            self.remember_bridge(request, kind, &path, rate).await;
            self.remember_live(request, rate).await;
            return Some(path.result(request, rate, legs));
        }
        None
    }

    async fn try_fallback(
        &self,
        request: &ConversionRequest,
        kind: PairKind,
        last_error: Option<ProviderError>,
    ) -> ConversionResult {
        debug!("Falling back for {}", request.pair());
        let (base, quote) = (request.base.as_str(), request.quote.as_str());

        let last_known = CacheKey::Fallback { base, quote }.to_string();
        if let Some(rate) = self.cache_get(&last_known).await {
            return ConversionResult::success(
                request.pair(),
                ConversionMethod::Cached,
                rate,
                request.amount,
                confidence::STALE_CACHE,
            )
            .from_cache();
        }

        let estimate_key = CacheKey::Estimate { base, quote }.to_string();
        if let Some(rate) = self.cache_get(&estimate_key).await {
            return ConversionResult::success(
                request.pair(),
                ConversionMethod::Fallback,
                rate,
                request.amount,
                confidence::ESTIMATED,
            )
            .from_cache()
            .with_note(ESTIMATE_NOTE);
        }

        if let Some(rate) = self.estimates().estimate(base, quote, kind) {
            self.cache_set(&estimate_key, rate, self.settings.ttl.fallback())
                .await;
            return ConversionResult::success(
                request.pair(),
                ConversionMethod::Fallback,
                rate,
                request.amount,
                confidence::ESTIMATED,
            )
            .with_note(ESTIMATE_NOTE);
        }

        let message = match last_error {
            Some(err) => format!(
                "No conversion route found for {} (last error: {})",
                request.pair(),
                err
            ),
            None => format!("No conversion route found for {}", request.pair()),
        };
        ConversionResult::failure(request.pair(), ConversionMethod::Fallback, message)
    }

    /// Rate for one bridge leg: cache, then `from/to`, then the inverse of
    /// `to/from`. The inverse ignores spread and fees.
    async fn leg_rate(
        &self,
        from: &str,
        to: &str,
        last_error: &mut Option<ProviderError>,
    ) -> Option<f64> {
        let key = CacheKey::Leg { from, to }.to_string();
        if let Some(rate) = self.cache_get(&key).await {
            return Some(rate);
        }

        let rate = match self.catalog.classify(from, to) {
            Some(kind) => self.fetch(from, to, kind, last_error).await,
            None => None,
        };
        let rate = match rate {
            Some(rate) => Some(rate),
            None => match self.catalog.classify(to, from) {
                Some(kind) => self
                    .fetch(to, from, kind, last_error)
                    .await
                    .map(|inverse| 1.0 / inverse),
                None => None,
            },
        }?;

        self.cache_set(&key, rate, self.settings.ttl.live(self.catalog.classify(from, to)))
            .await;
        Some(rate)
    }

    fn provider_for(&self, kind: PairKind) -> Option<&Arc<dyn RateProvider>> {
        match kind {
            PairKind::FiatToFiat => self.fiat_provider.as_ref(),
            _ => self.crypto_provider.as_ref(),
        }
    }

    /// One bounded provider call. Returns only positive finite rates.
    async fn fetch(
        &self,
        base: &str,
        quote: &str,
        kind: PairKind,
        last_error: &mut Option<ProviderError>,
    ) -> Option<f64> {
        let provider = self.provider_for(kind)?;
        let name = provider.name();
        self.stats.record_attempt(name, kind);

        let outcome = match tokio::time::timeout(
            self.settings.provider_timeout,
            provider.fetch_rate(base, quote, kind),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::Timeout {
                provider: name,
                pair: format!("{base}/{quote}"),
            }),
        };

        let err = match outcome {
            Ok(rate) if rate.is_finite() && rate > 0.0 => return Some(rate),
            Ok(rate) => ProviderError::Malformed {
                provider: name,
                message: format!("non-positive rate {rate} for {base}/{quote}"),
            },
            Err(err) => err,
        };
        warn!("{} failed for {}/{}: {}", name, base, quote, err);
        self.stats.record_provider_failure(name, err.category());
        *last_error = Some(err);
        None
    }

    /// Caches a bridged rate for the pair. It expires no later than the
    /// shortest-lived of its legs.
    async fn remember_bridge(
        &self,
        request: &ConversionRequest,
        kind: PairKind,
        path: &PivotPath<'_>,
        rate: f64,
    ) {
        let ttl = path
            .hops(request)
            .into_iter()
            .map(|(from, to)| self.settings.ttl.live(self.catalog.classify(from, to)))
            .fold(self.settings.ttl.live(Some(kind)), Duration::min);
        let via = path.via();
        let key = CacheKey::Bridge {
            base: &request.base,
            quote: &request.quote,
            via: &via,
        }
        .to_string();
        self.cache_set(&key, rate, ttl).await;
    }

    /// Keeps a live rate around as the stale fallback for this pair.
    async fn remember_live(&self, request: &ConversionRequest, rate: f64) {
        let key = CacheKey::Fallback {
            base: &request.base,
            quote: &request.quote,
        }
        .to_string();
        self.cache_set(&key, rate, self.settings.ttl.fallback()).await;
    }

    async fn cache_get(&self, key: &str) -> Option<f64> {
        match self.cache.get(key).await {
            Ok(rate) => rate,
            Err(e) => {
                warn!("Cache read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, rate: f64, ttl: Duration) {
        if let Err(e) = self.cache.set(key, rate, ttl).await {
            warn!("Cache write failed for {}: {:#}", key, e);
        }
    }
}
