//! Static last-resort rate estimates.
//!
//! The table is plain data: it can be loaded from YAML and swapped at
//! runtime because hardcoded market prices go stale.

use crate::core::asset::PairKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Per pair-kind constants used when nothing better is known.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KindDefaults {
    pub crypto_to_crypto: f64,
    pub crypto_to_fiat: f64,
    pub fiat_to_crypto: f64,
    pub fiat_to_fiat: f64,
}

impl Default for KindDefaults {
    fn default() -> Self {
        Self {
            crypto_to_crypto: 0.5,
            crypto_to_fiat: 1000.0,
            fiat_to_crypto: 0.001,
            fiat_to_fiat: 1.0,
        }
    }
}

impl KindDefaults {
    fn for_kind(&self, kind: PairKind) -> f64 {
        match kind {
            PairKind::CryptoToCrypto => self.crypto_to_crypto,
            PairKind::CryptoToFiat => self.crypto_to_fiat,
            PairKind::FiatToCrypto => self.fiat_to_crypto,
            PairKind::FiatToFiat => self.fiat_to_fiat,
        }
    }
}

fn default_reserve() -> String {
    "USD".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EstimatedRateTable {
    /// Asset every `X/<reserve>` entry is quoted in.
    #[serde(default = "default_reserve")]
    pub reserve: String,
    /// Rates keyed by `BASE/QUOTE`.
    #[serde(default)]
    pub rates: HashMap<String, f64>,
    #[serde(default)]
    pub defaults: Option<KindDefaults>,
}

const BUILTIN_RATES: &[(&str, f64)] = &[
    ("BTC/USD", 63420.0),
    ("ETH/USD", 2580.0),
    ("USDT/USD", 1.0),
    ("BNB/USD", 582.0),
    ("SOL/USD", 142.5),
    ("USDC/USD", 1.0),
    ("XRP/USD", 0.5891),
    ("DOGE/USD", 0.1058),
    ("ADA/USD", 0.3512),
    ("TRX/USD", 0.1634),
    ("AVAX/USD", 26.84),
    ("SHIB/USD", 0.00001425),
    ("TON/USD", 5.42),
    ("LINK/USD", 11.23),
    ("DOT/USD", 4.18),
    ("MATIC/USD", 0.3847),
    ("BCH/USD", 320.5),
    ("ICP/USD", 7.89),
    ("UNI/USD", 6.78),
    ("LTC/USD", 66.2),
    ("NEAR/USD", 4.12),
    ("APT/USD", 8.95),
    ("STX/USD", 1.89),
    ("XLM/USD", 0.0934),
    ("ATOM/USD", 4.23),
    ("HBAR/USD", 0.0512),
    ("FIL/USD", 3.67),
    ("VET/USD", 0.0198),
    ("ETC/USD", 18.9),
    ("ALGO/USD", 0.1234),
    ("ETH/ADA", 5173.37),
    ("BTC/ETH", 24.58),
    ("BTC/ADA", 180584.0),
    ("ETH/DOGE", 24386.0),
    ("SOL/ADA", 405.8),
    ("LINK/DOT", 2.686),
    ("UNI/MATIC", 17.63),
    ("USD/EUR", 0.9156),
    ("USD/GBP", 0.7512),
    ("USD/JPY", 149.85),
    ("USD/CAD", 1.3542),
    ("USD/AUD", 1.4789),
    ("USD/CHF", 0.8456),
    ("USD/CNY", 7.0892),
    ("USD/KRW", 1337.5),
    ("EUR/USD", 1.0922),
    ("GBP/USD", 1.3312),
    ("JPY/USD", 0.006673),
    ("CAD/USD", 0.7384),
];

impl Default for EstimatedRateTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EstimatedRateTable {
    pub fn builtin() -> Self {
        Self {
            reserve: default_reserve(),
            rates: BUILTIN_RATES
                .iter()
                .map(|(pair, rate)| (pair.to_string(), *rate))
                .collect(),
            defaults: Some(KindDefaults::default()),
        }
    }

    /// A table with no entries and no defaults, which never estimates.
    pub fn empty() -> Self {
        Self {
            reserve: default_reserve(),
            rates: HashMap::new(),
            defaults: None,
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "Failed to read estimated rates file: {}",
                path.as_ref().display()
            )
        })?;
        let table: Self = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse estimated rates file: {}",
                path.as_ref().display()
            )
        })?;
        debug!("Loaded {} estimated rates", table.rates.len());
        Ok(table)
    }

    fn lookup(&self, base: &str, quote: &str) -> Option<f64> {
        self.rates
            .get(&format!("{base}/{quote}"))
            .copied()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
    }

    fn reserve_rate(&self, symbol: &str) -> Option<f64> {
        if symbol == self.reserve {
            Some(1.0)
        } else {
            self.lookup(symbol, &self.reserve)
        }
    }

    /// Estimates `base/quote`: exact pair, then inverse, then via the
    /// reserve asset, then the default for the pair kind.
    pub fn estimate(&self, base: &str, quote: &str, kind: PairKind) -> Option<f64> {
        if let Some(rate) = self.lookup(base, quote) {
            return Some(rate);
        }

        if let Some(inverse) = self.lookup(quote, base) {
            return Some(1.0 / inverse);
        }

        if let (Some(base_reserve), Some(quote_reserve)) =
            (self.reserve_rate(base), self.reserve_rate(quote))
        {
            return Some(base_reserve / quote_reserve);
        }

        self.defaults.as_ref().map(|d| d.for_kind(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_exact_and_inverse_lookup() {
        let table = EstimatedRateTable::builtin();
        assert_eq!(
            table.estimate("BTC", "USD", PairKind::CryptoToFiat),
            Some(63420.0)
        );
        let usd_btc = table.estimate("USD", "BTC", PairKind::FiatToCrypto).unwrap();
        assert!((usd_btc - 1.0 / 63420.0).abs() < 1e-12);
    }

    #[test]
    fn test_reserve_normalized_estimate() {
        let table = EstimatedRateTable::builtin();
        let sol_doge = table
            .estimate("SOL", "DOGE", PairKind::CryptoToCrypto)
            .unwrap();
        assert!((sol_doge - 142.5 / 0.1058).abs() < 1e-9);
    }

    #[test]
    fn test_kind_defaults() {
        let table = EstimatedRateTable::builtin();
        assert_eq!(
            table.estimate("PEPE", "BONK", PairKind::CryptoToCrypto),
            Some(0.5)
        );
        assert_eq!(
            table.estimate("PEPE", "INR", PairKind::CryptoToFiat),
            Some(1000.0)
        );
        assert_eq!(
            table.estimate("INR", "PEPE", PairKind::FiatToCrypto),
            Some(0.001)
        );
        assert_eq!(
            table.estimate("INR", "BRL", PairKind::FiatToFiat),
            Some(1.0)
        );
    }

    #[test]
    fn test_empty_table_never_estimates() {
        let table = EstimatedRateTable::empty();
        assert_eq!(table.estimate("BTC", "USD", PairKind::CryptoToFiat), None);
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
reserve: EUR
rates:
  "BTC/EUR": 58000.0
  "GBP/EUR": 1.17
"#
        )
        .unwrap();

        let table = EstimatedRateTable::load_from_path(file.path()).unwrap();
        assert_eq!(table.reserve, "EUR");
        assert!(table.defaults.is_none());
        let btc_gbp = table
            .estimate("BTC", "GBP", PairKind::CryptoToFiat)
            .unwrap();
        assert!((btc_gbp - 58000.0 / 1.17).abs() < 1e-9);
        assert_eq!(table.estimate("ETH", "GBP", PairKind::CryptoToFiat), None);
    }
}
