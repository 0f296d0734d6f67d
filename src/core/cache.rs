//! Rate cache abstraction and key layout.

use crate::core::asset::PairKind;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// A key/value store of rates with per-entry expiry.
///
/// `get` must report an entry older than its TTL as absent.
#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<f64>>;

    async fn set(&self, key: &str, rate: f64, ttl: Duration) -> Result<()>;

    /// Usage counters for the health report. Backends without bookkeeping
    /// report zeros.
    async fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Entry limit, `None` when the backend is unbounded.
    pub capacity: Option<usize>,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room for new ones.
    pub evictions: u64,
}

/// The kinds of cached rates. Each kind renders with its own prefix and
/// keeps pair direction, so `BTC:USD` and `USD:BTC` never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey<'a> {
    Direct { base: &'a str, quote: &'a str },
    Leg { from: &'a str, to: &'a str },
    Fallback { base: &'a str, quote: &'a str },
    Estimate { base: &'a str, quote: &'a str },
    /// A bridged pair together with its pivot path, e.g. `USD` or `USD+BTC`.
    Bridge {
        base: &'a str,
        quote: &'a str,
        via: &'a str,
    },
    Probe,
}

impl Display for CacheKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Direct { base, quote } => write!(f, "direct:{base}:{quote}"),
            CacheKey::Leg { from, to } => write!(f, "rate:{from}:{to}"),
            CacheKey::Fallback { base, quote } => write!(f, "fallback:{base}:{quote}"),
            CacheKey::Estimate { base, quote } => write!(f, "estimate:{base}:{quote}"),
            CacheKey::Bridge { base, quote, via } => write!(f, "bridge:{base}:{quote}:{via}"),
            CacheKey::Probe => write!(f, "health_check"),
        }
    }
}

fn default_crypto_secs() -> u64 {
    60
}

fn default_fiat_secs() -> u64 {
    300
}

fn default_fallback_secs() -> u64 {
    3600
}

/// Expiry per cache category, in seconds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheTtl {
    #[serde(default = "default_crypto_secs")]
    pub crypto_secs: u64,
    #[serde(default = "default_fiat_secs")]
    pub fiat_secs: u64,
    #[serde(default = "default_fallback_secs")]
    pub fallback_secs: u64,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            crypto_secs: default_crypto_secs(),
            fiat_secs: default_fiat_secs(),
            fallback_secs: default_fallback_secs(),
        }
    }
}

impl CacheTtl {
    /// TTL for a live rate (direct or bridge leg) of the given pair kind.
    pub fn live(&self, kind: Option<PairKind>) -> Duration {
        match kind {
            Some(PairKind::FiatToFiat) => Duration::from_secs(self.fiat_secs),
            _ => Duration::from_secs(self.crypto_secs),
        }
    }

    /// TTL for last-known and estimated rates.
    pub fn fallback(&self) -> Duration {
        Duration::from_secs(self.fallback_secs)
    }
}
