//! Rate provider abstraction

use crate::core::asset::PairKind;
use crate::core::error::ProviderError;
use async_trait::async_trait;

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Stable identifier used in statistics, e.g. `exchangerates_api`.
    fn name(&self) -> &'static str;

    /// Returns how many units of `quote` one unit of `base` buys.
    async fn fetch_rate(&self, base: &str, quote: &str, kind: PairKind)
    -> Result<f64, ProviderError>;
}
