//! Concurrent conversion of many requests.

use crate::core::conversion::{ConversionRequest, ConversionResult};
use crate::router::ConversionRouter;
use anyhow::{Context, Result, bail};
use futures::future::join_all;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_ms")]
    pub elapsed: Duration,
}

fn serialize_ms<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_micros() as f64 / 1000.0)
}

impl BatchSummary {
    pub fn from_results(results: &[ConversionResult], elapsed: Duration) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|r| r.is_success()).count();
        Self {
            total,
            successful,
            failed: total - successful,
            success_rate: if total == 0 {
                0.0
            } else {
                successful as f64 / total as f64
            },
            elapsed,
        }
    }
}

/// Parses `BASE:QUOTE[:AMOUNT]`; the amount defaults to 1.
pub fn parse_batch_item(item: &str) -> Result<ConversionRequest> {
    let parts: Vec<&str> = item.split(':').collect();
    let (base, quote, amount) = match parts.as_slice() {
        [base, quote] => (*base, *quote, 1.0),
        [base, quote, amount] => {
            let amount = amount
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Invalid amount in batch item '{item}'"))?;
            (*base, *quote, amount)
        }
        _ => bail!("Batch item '{item}' must look like BASE:QUOTE[:AMOUNT]"),
    };
    ConversionRequest::new(base, quote, amount)
        .with_context(|| format!("Invalid batch item '{item}'"))
}

/// Runs every request with at most `concurrency` in flight and returns the
/// results in request order.
///
/// Empty batches and batches larger than `max_size` are rejected before
/// any conversion starts. `on_complete` is called once per finished
/// conversion.
pub async fn convert_batch(
    router: &ConversionRouter,
    requests: &[ConversionRequest],
    max_size: usize,
    concurrency: usize,
    on_complete: &(dyn Fn() + Send + Sync),
) -> Result<(Vec<ConversionResult>, BatchSummary)> {
    if requests.is_empty() {
        bail!("Batch contains no conversions");
    }
    if requests.len() > max_size {
        bail!(
            "Batch of {} conversions exceeds the limit of {}",
            requests.len(),
            max_size
        );
    }

    let started = Instant::now();
    let semaphore = Semaphore::new(concurrency.max(1));
    debug!(
        "Converting batch of {} with concurrency {}",
        requests.len(),
        concurrency
    );

    let tasks = requests.iter().map(|request| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await;
            let result = router
                .convert(&request.base, &request.quote, request.amount)
                .await;
            on_complete();
            result
        }
    });
    let results = join_all(tasks).await;

    let summary = BatchSummary::from_results(&results, started.elapsed());
    info!(
        "Batch finished: {}/{} successful in {:?}",
        summary.successful, summary.total, summary.elapsed
    );
    Ok((results, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::tests::{MockProvider, small_catalog};
    use crate::store::memory::MemoryRateCache;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn router() -> ConversionRouter {
        ConversionRouter::new(small_catalog(), Arc::new(MemoryRateCache::new()))
            .with_crypto_provider(Arc::new(MockProvider::new(
                "crypto",
                &[("BTC/USD", 50_000.0), ("ETH/USD", 2500.0)],
            )))
            .with_fiat_provider(Arc::new(MockProvider::new("fiat", &[("USD/EUR", 0.9)])))
    }

    #[test]
    fn test_parse_batch_item() {
        let request = parse_batch_item("btc:usd:2.5").unwrap();
        assert_eq!(request.base, "BTC");
        assert_eq!(request.quote, "USD");
        assert_eq!(request.amount, 2.5);

        assert_eq!(parse_batch_item("ETH:EUR").unwrap().amount, 1.0);
        assert!(parse_batch_item("BTC").is_err());
        assert!(parse_batch_item("BTC:USD:abc").is_err());
        assert!(parse_batch_item("BTC:USD:0").is_err());
        assert!(parse_batch_item("BTC:USD:1:2").is_err());
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_counts_completions() {
        let router = router();
        let requests: Vec<ConversionRequest> = ["BTC:USD:2", "USD:EUR:10", "BTC:XYZ", "ETH:USD"]
            .iter()
            .map(|item| parse_batch_item(item).unwrap())
            .collect();
        let completed = AtomicUsize::new(0);

        let (results, summary) = convert_batch(&router, &requests, 50, 2, &|| {
            completed.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        let pairs: Vec<&str> = results.iter().map(|r| r.pair.as_str()).collect();
        assert_eq!(pairs, vec!["BTC/USD", "USD/EUR", "BTC/XYZ", "ETH/USD"]);
        assert_eq!(results[0].converted_amount, Some(100_000.0));
        assert_eq!(completed.load(Ordering::SeqCst), 4);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success_rate, 0.75);
        assert_eq!(router.get_performance_stats().counters.total_conversions, 4);
    }

    #[tokio::test]
    async fn test_batch_limits_are_enforced() {
        let router = router();
        let requests = vec![parse_batch_item("BTC:USD").unwrap(); 3];

        let err = convert_batch(&router, &requests, 2, 4, &|| {}).await.unwrap_err();
        assert!(err.to_string().contains("exceeds the limit of 2"));

        let err = convert_batch(&router, &[], 2, 4, &|| {}).await.unwrap_err();
        assert!(err.to_string().contains("no conversions"));
        assert_eq!(router.get_performance_stats().counters.total_conversions, 0);
    }
}
