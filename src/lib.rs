pub mod batch;
pub mod cli;
pub mod core;
pub mod health;
pub mod providers;
pub mod router;
pub mod store;

use crate::core::asset::AssetCatalog;
use crate::core::config::{AppConfig, COINMARKETCAP_API_KEY_VAR, EXCHANGE_API_KEY_VAR};
use crate::core::estimates::EstimatedRateTable;
use crate::providers::{CoinMarketCapProvider, ExchangeRateProvider, util::http_client};
use crate::router::{ConversionRouter, RoutingSettings};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub enum AppCommand {
    Convert {
        from: String,
        to: String,
        amount: f64,
        json: bool,
    },
    Batch {
        items: Vec<String>,
        json: bool,
        stats: bool,
    },
    Health {
        json: bool,
    },
    Assets,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("bridgefx starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config");

    match command {
        AppCommand::Assets => cli::assets::run(&load_catalog(&config)?),
        AppCommand::Convert {
            from,
            to,
            amount,
            json,
        } => {
            let router = build_router(&config)?;
            cli::convert::run(&router, &from, &to, amount, json).await
        }
        AppCommand::Batch { items, json, stats } => {
            let router = build_router(&config)?;
            cli::convert::run_batch(&router, &items, &config.batch, json, stats).await
        }
        AppCommand::Health { json } => {
            let router = build_router(&config)?;
            cli::health::run(&router, json).await
        }
    }
}

pub fn load_catalog(config: &AppConfig) -> Result<AssetCatalog> {
    AssetCatalog::load(
        config.catalog.crypto_path.as_deref(),
        config.catalog.fiat_path.as_deref(),
    )
}

/// Wires catalog, cache, estimates and every provider that has a
/// credential into a router.
pub fn build_router(config: &AppConfig) -> Result<ConversionRouter> {
    let catalog = Arc::new(load_catalog(config)?);
    let cache = store::open_cache(config)?;
    let estimates = match &config.estimates_path {
        Some(path) => EstimatedRateTable::load_from_path(path)?,
        None => EstimatedRateTable::builtin(),
    };

    let mut router = ConversionRouter::new(catalog, cache)
        .with_estimates(estimates)
        .with_settings(RoutingSettings::from_config(config));

    let client = http_client(Duration::from_secs(config.providers.timeout_secs))?;
    let retries = config.providers.retries;

    if let Some(fx) = &config.providers.exchangerates {
        match fx.api_key_or_env(EXCHANGE_API_KEY_VAR) {
            Some(key) => {
                router = router.with_fiat_provider(Arc::new(ExchangeRateProvider::new(
                    client.clone(),
                    &fx.base_url,
                    &key,
                    retries,
                )));
            }
            None => warn!("No ExchangeRate-API key configured, fiat rates will use fallbacks"),
        }
    }

    if let Some(cmc) = &config.providers.coinmarketcap {
        match cmc.api_key_or_env(COINMARKETCAP_API_KEY_VAR) {
            Some(key) => {
                router = router.with_crypto_provider(Arc::new(CoinMarketCapProvider::new(
                    client,
                    &cmc.base_url,
                    &key,
                    retries,
                )));
            }
            None => warn!("No CoinMarketCap key configured, crypto rates will use fallbacks"),
        }
    }

    Ok(router)
}
