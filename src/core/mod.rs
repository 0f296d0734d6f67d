//! Domain types and the seams the router is built on.

pub mod asset;
pub mod cache;
pub mod config;
pub mod conversion;
pub mod error;
pub mod estimates;
pub mod log;
pub mod metrics;
pub mod provider;

pub use asset::{AssetCatalog, AssetKind, PairKind};
pub use cache::{CacheKey, CacheTtl, RateCache};
pub use conversion::{BridgeLeg, ConversionMethod, ConversionRequest, ConversionResult};
pub use error::{ErrorCategory, ProviderError};
pub use provider::RateProvider;
