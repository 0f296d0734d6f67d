//! Conversion requests, results and the methods that produce them.

use anyhow::{Result, bail};
use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::time::Duration;

/// Heuristic confidence attached to each kind of outcome.
pub mod confidence {
    pub const DIRECT: f64 = 1.0;
    pub const SINGLE_BRIDGE: f64 = 0.8;
    pub const DOUBLE_BRIDGE: f64 = 0.6;
    pub const STALE_CACHE: f64 = 0.3;
    pub const ESTIMATED: f64 = 0.2;
    pub const NONE: f64 = 0.0;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub base: String,
    pub quote: String,
    pub amount: f64,
}

impl ConversionRequest {
    pub fn new(base: &str, quote: &str, amount: f64) -> Result<Self> {
        let base = base.trim().to_uppercase();
        let quote = quote.trim().to_uppercase();
        if base.is_empty() || quote.is_empty() {
            bail!("Missing currency codes");
        }
        if !amount.is_finite() || amount <= 0.0 {
            bail!("Amount must be a positive number, got {amount}");
        }
        Ok(Self {
            base,
            quote,
            amount,
        })
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionMethod {
    /// Exact pair from the crypto provider, or a same-asset conversion.
    Direct,
    /// Exact pair from the fiat provider.
    FxDirect,
    Bridge {
        pivot: String,
    },
    DoubleBridge {
        first: String,
        second: String,
    },
    /// Estimated rate from the static table.
    Fallback,
    /// Last known live rate.
    Cached,
}

impl ConversionMethod {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ConversionMethod::Fallback | ConversionMethod::Cached)
    }
}

impl Display for ConversionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionMethod::Direct => write!(f, "direct"),
            ConversionMethod::FxDirect => write!(f, "fx_direct"),
            ConversionMethod::Bridge { pivot } => write!(f, "bridge via {pivot}"),
            ConversionMethod::DoubleBridge { first, second } => {
                write!(f, "bridge via {first}+{second}")
            }
            ConversionMethod::Fallback => write!(f, "fallback"),
            ConversionMethod::Cached => write!(f, "cached"),
        }
    }
}

impl Serialize for ConversionMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One hop of a bridged conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeLeg {
    pub pair: String,
    pub rate: f64,
}

impl BridgeLeg {
    pub fn new(from: &str, to: &str, rate: f64) -> Self {
        Self {
            pair: format!("{from}/{to}"),
            rate,
        }
    }
}

fn serialize_latency_ms<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(latency.as_micros() as f64 / 1000.0)
}

/// Outcome of a single conversion.
///
/// `rate`, `converted_amount` and a non-zero `confidence` are present
/// together or not at all.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub pair: String,
    pub method: ConversionMethod,
    pub rate: Option<f64>,
    pub converted_amount: Option<f64>,
    pub confidence: f64,
    #[serde(rename = "latency_ms", serialize_with = "serialize_latency_ms")]
    pub latency: Duration,
    pub bridge_rates: Vec<BridgeLeg>,
    pub error: Option<String>,
    pub cached: bool,
}

impl ConversionResult {
    pub fn success(
        pair: String,
        method: ConversionMethod,
        rate: f64,
        amount: f64,
        confidence: f64,
    ) -> Self {
        Self {
            pair,
            method,
            rate: Some(rate),
            converted_amount: Some(amount * rate),
            confidence,
            latency: Duration::ZERO,
            bridge_rates: Vec::new(),
            error: None,
            cached: false,
        }
    }

    pub fn failure(pair: String, method: ConversionMethod, error: impl Into<String>) -> Self {
        Self {
            pair,
            method,
            rate: None,
            converted_amount: None,
            confidence: confidence::NONE,
            latency: Duration::ZERO,
            bridge_rates: Vec::new(),
            error: Some(error.into()),
            cached: false,
        }
    }

    pub fn with_legs(mut self, legs: Vec<BridgeLeg>) -> Self {
        self.bridge_rates = legs;
        self
    }

    pub fn from_cache(mut self) -> Self {
        self.cached = true;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.error = Some(note.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn is_success(&self) -> bool {
        self.rate.is_some()
    }
}
