//! Crypto and fiat asset catalog used to route pairs to providers.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const BUILTIN_CRYPTO: &[&str] = &[
    "BTC", "ETH", "XRP", "USDT", "BNB", "SOL", "USDC", "DOGE", "TRX", "ADA", "HYPE", "LINK",
    "AVAX", "USDE", "SUI", "XLM", "BCH", "HBAR", "LTC", "LEO", "CRO", "TON", "SHIB", "DOT", "UNI",
    "WLFI", "MNT", "XMR", "DAI", "ENA", "AAVE", "PEPE", "OKB", "NEAR", "BGB", "TAO", "IP", "ONDO",
    "APT", "ETC", "WLD", "PI", "ARB", "POL", "USD1", "ICP", "PUMP", "M", "MYX", "PENGU", "KAS",
    "VET", "ATOM", "ALGO", "RENDER", "KCS", "SEI", "BONK", "SKY", "FIL", "FLR", "TRUMP", "IMX",
    "JUP", "FET", "OP", "INJ", "GT", "XDC", "TIA", "PYUSD", "SPX", "QNT", "STX", "FDUSD", "LDO",
    "ASTER", "AERO", "CRV", "PAXG", "GRT", "PYTH", "KAIA", "CAKE", "FLOKI", "CFX", "XAUT", "WIF",
    "ENS", "S", "FARTCOIN", "RAY", "PENDLE", "VIRTUAL", "NEXO", "THETA", "XTZ", "GALA", "ZEC",
    "ETHFI",
];

const BUILTIN_FIAT: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CNY", "CAD", "AUD", "CHF", "KRW", "INR", "BRL", "RUB", "MXN",
    "ZAR", "TRY", "SAR", "ARS", "IDR", "SEK", "NOK", "DKK", "PLN", "CZK", "HUF", "RON", "BGN",
    "HRK", "ISK", "SGD", "HKD", "TWD", "THB", "MYR", "PHP", "VND", "NZD", "PKR", "BDT", "LKR",
    "MMK", "AED", "QAR", "KWD", "BHD", "OMR", "JOD", "ILS", "EGP", "NGN", "KES", "GHS", "MAD",
    "TND", "ETB", "UGX", "CLP", "COP", "PEN", "UYU", "BOB", "PYG", "GTQ", "CRC", "PAB", "DOP",
    "JMD", "TTD", "XAF", "XOF", "XCD", "FJD", "PGK", "SBD", "TOP", "VUV", "WST", "XPF", "AMD",
    "AZN", "GEL", "KGS", "KZT", "MDL", "TJS", "TMT", "UZS", "BYN", "UAH", "ALL", "BAM", "MKD",
    "RSD", "CUP", "HTG", "NIO", "SVC", "AWG", "BBD",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Crypto,
    Fiat,
}

/// The asset-type combination of a `(base, quote)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairKind {
    CryptoToFiat,
    FiatToCrypto,
    CryptoToCrypto,
    FiatToFiat,
}

impl PairKind {
    pub fn from_kinds(base: AssetKind, quote: AssetKind) -> Self {
        match (base, quote) {
            (AssetKind::Crypto, AssetKind::Fiat) => PairKind::CryptoToFiat,
            (AssetKind::Fiat, AssetKind::Crypto) => PairKind::FiatToCrypto,
            (AssetKind::Crypto, AssetKind::Crypto) => PairKind::CryptoToCrypto,
            (AssetKind::Fiat, AssetKind::Fiat) => PairKind::FiatToFiat,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PairKind::CryptoToFiat => "crypto_to_fiat",
            PairKind::FiatToCrypto => "fiat_to_crypto",
            PairKind::CryptoToCrypto => "crypto_to_crypto",
            PairKind::FiatToFiat => "fiat_to_fiat",
        }
    }
}

impl Display for PairKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Two disjoint sets of uppercase asset symbols.
#[derive(Debug, Clone)]
pub struct AssetCatalog {
    crypto: HashSet<String>,
    fiat: HashSet<String>,
}

fn normalize_symbols<I, S>(symbols: I, side: &str) -> Result<HashSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = HashSet::new();
    for raw in symbols {
        let symbol = raw.as_ref().trim().to_uppercase();
        if symbol.is_empty()
            || symbol.len() > 10
            || !symbol.chars().all(|c| c.is_ascii_alphanumeric())
        {
            bail!("Invalid {side} symbol in catalog: '{}'", raw.as_ref());
        }
        set.insert(symbol);
    }
    Ok(set)
}

fn read_symbol_file(path: &Path) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

impl AssetCatalog {
    pub fn new<C, F, S1, S2>(crypto: C, fiat: F) -> Result<Self>
    where
        C: IntoIterator<Item = S1>,
        F: IntoIterator<Item = S2>,
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        let crypto = normalize_symbols(crypto, "crypto")?;
        let fiat = normalize_symbols(fiat, "fiat")?;

        let mut overlap: Vec<&String> = crypto.intersection(&fiat).collect();
        if !overlap.is_empty() {
            overlap.sort();
            bail!("Symbols listed as both crypto and fiat: {overlap:?}");
        }

        Ok(Self { crypto, fiat })
    }

    pub fn builtin() -> Self {
        Self {
            crypto: BUILTIN_CRYPTO.iter().map(|s| s.to_string()).collect(),
            fiat: BUILTIN_FIAT.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Loads the catalog from symbol-per-line files.
    ///
    /// Either side falls back to the built-in list when its file is not
    /// given or cannot be read.
    pub fn load(crypto_path: Option<&Path>, fiat_path: Option<&Path>) -> Result<Self> {
        let crypto = Self::load_side(crypto_path, BUILTIN_CRYPTO, "crypto");
        let fiat = Self::load_side(fiat_path, BUILTIN_FIAT, "fiat");
        let catalog = Self::new(crypto, fiat)?;
        info!(
            crypto = catalog.crypto_count(),
            fiat = catalog.fiat_count(),
            "Asset catalog loaded"
        );
        Ok(catalog)
    }

    fn load_side(path: Option<&Path>, builtin: &[&str], side: &str) -> Vec<String> {
        let Some(path) = path else {
            debug!("No {side} asset file configured, using built-in list");
            return builtin.iter().map(|s| s.to_string()).collect();
        };

        match read_symbol_file(path) {
            Ok(symbols) => {
                debug!("Loaded {} {side} assets from {}", symbols.len(), path.display());
                symbols
            }
            Err(e) => {
                warn!(
                    "Could not read {side} assets from {}: {e}. Using built-in list",
                    path.display()
                );
                builtin.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    pub fn kind(&self, symbol: &str) -> Option<AssetKind> {
        if self.crypto.contains(symbol) {
            Some(AssetKind::Crypto)
        } else if self.fiat.contains(symbol) {
            Some(AssetKind::Fiat)
        } else {
            None
        }
    }

    pub fn is_crypto(&self, symbol: &str) -> bool {
        self.crypto.contains(symbol)
    }

    pub fn is_fiat(&self, symbol: &str) -> bool {
        self.fiat.contains(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.kind(symbol).is_some()
    }

    pub fn classify(&self, base: &str, quote: &str) -> Option<PairKind> {
        Some(PairKind::from_kinds(self.kind(base)?, self.kind(quote)?))
    }

    pub fn crypto_count(&self) -> usize {
        self.crypto.len()
    }

    pub fn fiat_count(&self) -> usize {
        self.fiat.len()
    }

    pub fn symbols(&self, kind: AssetKind) -> Vec<&str> {
        let set = match kind {
            AssetKind::Crypto => &self.crypto,
            AssetKind::Fiat => &self.fiat,
        };
        let mut symbols: Vec<&str> = set.iter().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Every ordered `BASE/QUOTE` pair the catalog can express, sorted.
    pub fn supported_pairs(&self) -> Vec<String> {
        let mut assets: Vec<&String> = self.crypto.iter().chain(self.fiat.iter()).collect();
        assets.sort();

        let mut pairs = Vec::with_capacity(assets.len() * assets.len().saturating_sub(1));
        for base in &assets {
            for quote in &assets {
                if base != quote {
                    pairs.push(format!("{base}/{quote}"));
                }
            }
        }
        pairs
    }
}

impl Default for AssetCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
