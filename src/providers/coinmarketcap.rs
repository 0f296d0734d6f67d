use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::asset::PairKind;
use crate::core::error::ProviderError;
use crate::core::provider::RateProvider;
use crate::providers::util::with_retry;

pub const NAME: &str = "coinmarketcap_api";

const RETRY_DELAY_MS: u64 = 250;

/// CoinMarketCap status codes for exhausted plans and throttling.
const RATE_LIMIT_CODES: [i64; 4] = [1008, 1009, 1010, 1011];

/// Crypto quotes from CoinMarketCap's latest-quotes endpoint.
pub struct CoinMarketCapProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: usize,
}

impl CoinMarketCapProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, retries: usize) -> Self {
        CoinMarketCapProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retries,
        }
    }
}

#[derive(Deserialize, Debug)]
struct QuotesResponse {
    status: Status,
    #[serde(default)]
    data: HashMap<String, AssetQuotes>,
}

#[derive(Deserialize, Debug)]
struct Status {
    error_code: i64,
    error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AssetQuotes {
    #[serde(default)]
    quote: HashMap<String, Quote>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    price: Option<f64>,
}

/// Which symbol is quoted in which currency, and whether the answer is
/// the inverse of the requested rate.
fn query_for<'a>(base: &'a str, quote: &'a str, kind: PairKind) -> Option<(&'a str, &'a str, bool)> {
    match kind {
        PairKind::CryptoToFiat | PairKind::CryptoToCrypto => Some((base, quote, false)),
        PairKind::FiatToCrypto => Some((quote, base, true)),
        PairKind::FiatToFiat => None,
    }
}

fn status_error(status: Status, convert: &str) -> ProviderError {
    let message = status
        .error_message
        .unwrap_or_else(|| format!("error code {}", status.error_code));
    if RATE_LIMIT_CODES.contains(&status.error_code) {
        return ProviderError::RateLimited {
            provider: NAME,
            message,
        };
    }
    if message.contains("convert") && message.contains(convert) {
        return ProviderError::UnsupportedTarget {
            provider: NAME,
            target: convert.to_string(),
        };
    }
    ProviderError::rejected(NAME, message)
}

#[async_trait]
impl RateProvider for CoinMarketCapProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(name = "CoinMarketCapFetch", skip(self), fields(pair = %format!("{base}/{quote}")))]
    async fn fetch_rate(
        &self,
        base: &str,
        quote: &str,
        kind: PairKind,
    ) -> Result<f64, ProviderError> {
        let pair = format!("{base}/{quote}");
        let (symbol, convert, invert) =
            query_for(base, quote, kind).ok_or_else(|| ProviderError::UnsupportedTarget {
                provider: NAME,
                target: pair.clone(),
            })?;

        let url = format!(
            "{}/cryptocurrency/quotes/latest?symbol={}&convert={}",
            self.base_url, symbol, convert
        );
        debug!("Requesting price data from {}", url);

        let response = with_retry(
            || {
                self.client
                    .get(&url)
                    .header("X-CMC_PRO_API_KEY", &self.api_key)
                    .header("Accept", "application/json")
                    .send()
            },
            self.retries,
            RETRY_DELAY_MS,
        )
        .await
        .map_err(|e| ProviderError::from_reqwest(NAME, &pair, e))?;

        let http_status = response.status();
        if http_status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                provider: NAME,
                message: format!("HTTP 429 for {pair}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &pair, e))?;

        let data = match serde_json::from_str::<QuotesResponse>(&body) {
            Ok(data) => data,
            Err(_) if !http_status.is_success() => {
                return Err(ProviderError::Http {
                    provider: NAME,
                    status: http_status.as_u16(),
                    pair,
                });
            }
            Err(e) => {
                return Err(ProviderError::Malformed {
                    provider: NAME,
                    message: format!("failed to parse JSON response for {pair}: {e}"),
                });
            }
        };

        if data.status.error_code != 0 {
            return Err(status_error(data.status, convert));
        }
        if !http_status.is_success() {
            return Err(ProviderError::Http {
                provider: NAME,
                status: http_status.as_u16(),
                pair,
            });
        }

        let asset = data
            .data
            .get(symbol)
            .or_else(|| data.data.values().next())
            .ok_or_else(|| ProviderError::Malformed {
                provider: NAME,
                message: format!("no data for symbol {symbol}"),
            })?;

        let price = asset
            .quote
            .get(convert)
            .ok_or_else(|| ProviderError::UnsupportedTarget {
                provider: NAME,
                target: convert.to_string(),
            })?
            .price
            .filter(|price| price.is_finite() && *price > 0.0)
            .ok_or_else(|| ProviderError::Malformed {
                provider: NAME,
                message: format!("missing price for {symbol} in {convert}"),
            })?;

        Ok(if invert { 1.0 / price } else { price })
    }
}
