//! Upstream provider failures and their observability categories.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// Coarse bucket a failure is tallied under in the engine statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Api,
    RateLimit,
    Network,
    Validation,
    Unsupported,
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::Api => "api",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

/// A failed attempt to obtain a rate from an upstream provider.
///
/// These never reach the caller of a conversion; the router recovers by
/// falling through to its next strategy.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {status} from {provider} for {pair}")]
    Http {
        provider: &'static str,
        status: u16,
        pair: String,
    },

    #[error("Rate limited by {provider}: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
    },

    #[error("Request to {provider} timed out for {pair}")]
    Timeout { provider: &'static str, pair: String },

    #[error("Network error from {provider}: {message}")]
    Network {
        provider: &'static str,
        message: String,
    },

    #[error("Malformed response from {provider}: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} rejected request: {message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} does not support convert target {target}")]
    UnsupportedTarget {
        provider: &'static str,
        target: String,
    },
}

fn mentions_rate_limit(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit") || message.contains("quota")
}

impl ProviderError {
    pub fn from_reqwest(provider: &'static str, pair: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider,
                pair: pair.to_string(),
            }
        } else if err.is_decode() {
            ProviderError::Malformed {
                provider,
                message: err.to_string(),
            }
        } else {
            ProviderError::Network {
                provider,
                message: err.to_string(),
            }
        }
    }

    /// Builds the error for an explicit upstream failure flag, promoting it
    /// to `RateLimited` when the message says so.
    pub fn rejected(provider: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        if mentions_rate_limit(&message) {
            ProviderError::RateLimited { provider, message }
        } else {
            ProviderError::Rejected { provider, message }
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Http { provider, .. }
            | ProviderError::RateLimited { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::Malformed { provider, .. }
            | ProviderError::Rejected { provider, .. }
            | ProviderError::UnsupportedTarget { provider, .. } => provider,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::RateLimited { .. } => ErrorCategory::RateLimit,
            ProviderError::Http { status: 429, .. } => ErrorCategory::RateLimit,
            ProviderError::Timeout { .. } | ProviderError::Network { .. } => {
                ErrorCategory::Network
            }
            ProviderError::Malformed { .. } => ErrorCategory::Validation,
            ProviderError::UnsupportedTarget { .. } => ErrorCategory::Unsupported,
            ProviderError::Http { .. } => ErrorCategory::Api,
            ProviderError::Rejected { message, .. } => {
                let message = message.to_lowercase();
                if message.contains("invalid") || message.contains("missing") {
                    ErrorCategory::Validation
                } else {
                    ErrorCategory::Api
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_promotes_rate_limit_messages() {
        let err = ProviderError::rejected("coinmarketcap_api", "Monthly quota exceeded");
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert_eq!(err.category(), ErrorCategory::RateLimit);

        let err = ProviderError::rejected("coinmarketcap_api", "Something broke");
        assert!(matches!(err, ProviderError::Rejected { .. }));
        assert_eq!(err.category(), ErrorCategory::Api);
    }

    #[test]
    fn test_categories() {
        let http_429 = ProviderError::Http {
            provider: "exchangerates_api",
            status: 429,
            pair: "USD/EUR".to_string(),
        };
        assert_eq!(http_429.category(), ErrorCategory::RateLimit);

        let http_500 = ProviderError::Http {
            provider: "exchangerates_api",
            status: 500,
            pair: "USD/EUR".to_string(),
        };
        assert_eq!(http_500.category(), ErrorCategory::Api);

        let timeout = ProviderError::Timeout {
            provider: "exchangerates_api",
            pair: "USD/EUR".to_string(),
        };
        assert_eq!(timeout.category(), ErrorCategory::Network);

        let invalid = ProviderError::rejected("exchangerates_api", "invalid-key");
        assert_eq!(invalid.category(), ErrorCategory::Validation);

        let unsupported = ProviderError::UnsupportedTarget {
            provider: "coinmarketcap_api",
            target: "XYZ".to_string(),
        };
        assert_eq!(unsupported.category(), ErrorCategory::Unsupported);
        assert_eq!(unsupported.provider(), "coinmarketcap_api");
    }

    #[test]
    fn test_error_messages() {
        let err = ProviderError::Http {
            provider: "exchangerates_api",
            status: 500,
            pair: "USD/EUR".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP error: 500 from exchangerates_api for USD/EUR"
        );
    }
}
