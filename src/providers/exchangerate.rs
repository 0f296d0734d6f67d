use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::asset::PairKind;
use crate::core::error::ProviderError;
use crate::core::provider::RateProvider;
use crate::providers::util::with_retry;

pub const NAME: &str = "exchangerates_api";

const RETRY_DELAY_MS: u64 = 250;

/// Fiat rates from ExchangeRate-API's pair endpoint.
pub struct ExchangeRateProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: usize,
}

impl ExchangeRateProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, retries: usize) -> Self {
        ExchangeRateProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retries,
        }
    }
}

#[derive(Deserialize, Debug)]
struct PairResponse {
    result: String,
    conversion_rate: Option<f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

#[async_trait]
impl RateProvider for ExchangeRateProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(name = "ExchangeRateFetch", skip(self, _kind), fields(pair = %format!("{base}/{quote}")))]
    async fn fetch_rate(
        &self,
        base: &str,
        quote: &str,
        _kind: PairKind,
    ) -> Result<f64, ProviderError> {
        let pair = format!("{base}/{quote}");
        let url = format!("{}/{}/pair/{}/{}", self.base_url, self.api_key, base, quote);
        debug!("Requesting {} from ExchangeRate-API", pair);

        let response = with_retry(|| self.client.get(&url).send(), self.retries, RETRY_DELAY_MS)
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &pair, e))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                provider: NAME,
                message: format!("HTTP 429 for {pair}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, &pair, e))?;

        match serde_json::from_str::<PairResponse>(&body) {
            Ok(data) if data.result == "success" && status.is_success() => data
                .conversion_rate
                .filter(|rate| rate.is_finite() && *rate > 0.0)
                .ok_or_else(|| ProviderError::Malformed {
                    provider: NAME,
                    message: format!("missing conversion_rate for {pair}"),
                }),
            Ok(data) if data.result != "success" => Err(ProviderError::rejected(
                NAME,
                data.error_type
                    .unwrap_or_else(|| "unknown-error".to_string()),
            )),
            Ok(_) => Err(ProviderError::Http {
                provider: NAME,
                status: status.as_u16(),
                pair,
            }),
            Err(_) if !status.is_success() => Err(ProviderError::Http {
                provider: NAME,
                status: status.as_u16(),
                pair,
            }),
            Err(e) => Err(ProviderError::Malformed {
                provider: NAME,
                message: format!("failed to parse JSON response for {pair}: {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorCategory;
    use crate::providers::util::http_client;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_for(mock_server: &MockServer) -> ExchangeRateProvider {
        let client = http_client(Duration::from_secs(2)).unwrap();
        ExchangeRateProvider::new(client, &mock_server.uri(), "test-key", 0)
    }

    async fn mount(mock_server: &MockServer, endpoint: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(response)
            .mount(mock_server)
            .await;
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_server = MockServer::start().await;
        mount(
            &mock_server,
            "/test-key/pair/USD/EUR",
            ResponseTemplate::new(200).set_body_string(
                r#"{"result": "success", "base_code": "USD", "target_code": "EUR", "conversion_rate": 0.9156}"#,
            ),
        )
        .await;

        let provider = provider_for(&mock_server).await;
        let rate = provider
            .fetch_rate("USD", "EUR", PairKind::FiatToFiat)
            .await
            .expect("Failed to get rate");
        assert_eq!(rate, 0.9156);
    }

    #[tokio::test]
    async fn test_error_type_is_surfaced() {
        let mock_server = MockServer::start().await;
        mount(
            &mock_server,
            "/test-key/pair/USD/XYZ",
            ResponseTemplate::new(404)
                .set_body_string(r#"{"result": "error", "error-type": "unsupported-code"}"#),
        )
        .await;

        let provider = provider_for(&mock_server).await;
        let err = provider
            .fetch_rate("USD", "XYZ", PairKind::FiatToFiat)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { .. }));
        assert!(err.to_string().contains("unsupported-code"));
        assert_eq!(err.category(), ErrorCategory::Api);
    }

    #[tokio::test]
    async fn test_quota_reached_is_rate_limited() {
        let mock_server = MockServer::start().await;
        mount(
            &mock_server,
            "/test-key/pair/USD/GBP",
            ResponseTemplate::new(200)
                .set_body_string(r#"{"result": "error", "error-type": "quota-reached"}"#),
        )
        .await;

        let provider = provider_for(&mock_server).await;
        let err = provider
            .fetch_rate("USD", "GBP", PairKind::FiatToFiat)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert_eq!(err.category(), ErrorCategory::RateLimit);
    }

    #[tokio::test]
    async fn test_http_429_is_rate_limited() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/test-key/pair/USD/JPY", ResponseTemplate::new(429)).await;

        let provider = provider_for(&mock_server).await;
        let err = provider
            .fetch_rate("USD", "JPY", PairKind::FiatToFiat)
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::RateLimit);
    }

    #[tokio::test]
    async fn test_server_error_without_payload() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/test-key/pair/USD/CAD", ResponseTemplate::new(500)).await;

        let provider = provider_for(&mock_server).await;
        let err = provider
            .fetch_rate("USD", "CAD", PairKind::FiatToFiat)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP error: 500 from exchangerates_api for USD/CAD");
    }

    #[tokio::test]
    async fn test_success_without_rate_is_malformed() {
        let mock_server = MockServer::start().await;
        mount(
            &mock_server,
            "/test-key/pair/USD/CHF",
            ResponseTemplate::new(200).set_body_string(r#"{"result": "success"}"#),
        )
        .await;

        let provider = provider_for(&mock_server).await;
        let err = provider
            .fetch_rate("USD", "CHF", PairKind::FiatToFiat)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }
}
