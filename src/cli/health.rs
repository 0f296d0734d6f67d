use super::ui::{self, StyleType};
use crate::core::metrics::PerformanceStats;
use crate::health::{CacheHealth, HealthReport, HealthStatus, health_check};
use crate::router::ConversionRouter;
use anyhow::Result;
use comfy_table::Cell;

pub fn display_stats(stats: &PerformanceStats) {
    println!("{}", ui::style_text("Performance", StyleType::Title));

    let counters = &stats.counters;
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);
    let rows = [
        ("Total conversions", counters.total_conversions.to_string()),
        ("Successful", counters.successful_conversions.to_string()),
        ("Success rate", format!("{:.1}%", stats.success_rate * 100.0)),
        ("Cache hits", counters.cache_hits.to_string()),
        ("Cache hit rate", format!("{:.1}%", stats.cache_hit_rate * 100.0)),
        ("Provider calls", counters.api_calls.to_string()),
        ("Fallback uses", counters.fallback_uses.to_string()),
        ("Average latency", format!("{:.2} ms", counters.avg_latency_ms)),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    println!("{table}");

    if !counters.api_call_breakdown.is_empty() {
        let distribution = stats.api_usage_distribution.clone();
        let mut providers = ui::new_styled_table();
        providers.set_header(vec![
            ui::header_cell("Provider"),
            ui::header_cell("Calls"),
            ui::header_cell("Failures"),
            ui::header_cell("Share"),
        ]);
        for (name, calls) in &counters.api_call_breakdown {
            providers.add_row(vec![
                Cell::new(name),
                Cell::new(calls),
                Cell::new(counters.api_failures.get(name).copied().unwrap_or(0)),
                ui::format_optional_cell(distribution.get(name).copied(), |share| {
                    format!("{share:.1}%")
                }),
            ]);
        }
        println!("{providers}");
    }

    let errors = &counters.error_breakdown;
    println!(
        "{} api {} · rate limit {} · network {} · validation {} · unsupported {}",
        ui::style_text("Errors:", StyleType::Label),
        errors.api_errors,
        errors.rate_limit_errors,
        errors.network_errors,
        errors.validation_errors,
        errors.unsupported_errors
    );
}

fn cache_detail(cache: &CacheHealth) -> String {
    if let Some(error) = &cache.error {
        return error.clone();
    }
    let stats = &cache.stats;
    let entries = match stats.capacity {
        Some(capacity) => format!("{}/{} entries", stats.entries, capacity),
        None => format!("{} entries", stats.entries),
    };
    format!(
        "{} · {} hits · {} misses · {} evictions",
        entries, stats.hits, stats.misses, stats.evictions
    )
}

fn display_report(report: &HealthReport) {
    let status = match report.status {
        HealthStatus::Healthy => ui::style_text("healthy", StyleType::Good),
        HealthStatus::Degraded => ui::style_text("degraded", StyleType::Error),
    };
    println!(
        "{} {} (v{}, {})",
        ui::style_text("Health:", StyleType::Title),
        status,
        report.version,
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Component"),
        ui::header_cell("Status"),
        ui::header_cell("Detail"),
    ]);
    table.add_row(vec![
        Cell::new("cache"),
        ui::flag_cell(report.cache.operational, "operational", "failed"),
        Cell::new(cache_detail(&report.cache)),
    ]);
    for provider in &report.providers {
        table.add_row(vec![
            Cell::new(format!("{} provider", provider.role)),
            ui::flag_cell(provider.configured, "configured", "not configured"),
            Cell::new(format!(
                "{} ({})",
                provider.name.unwrap_or("none"),
                provider.supports
            )),
        ]);
    }
    for result in &report.test_conversions {
        table.add_row(vec![
            Cell::new(format!("test {}", result.pair)),
            ui::flag_cell(result.is_success(), "ok", "failed"),
            Cell::new(format!(
                "{} · confidence {:.1}",
                result.method, result.confidence
            )),
        ]);
    }
    println!("{table}");

    println!(
        "{} {} crypto, {} fiat, {} pivots",
        ui::style_text("Coverage:", StyleType::Label),
        report.asset_coverage.crypto_assets,
        report.asset_coverage.fiat_assets,
        report.asset_coverage.pivot_currencies
    );
    for issue in &report.issues {
        println!("{}", ui::style_text(&format!("• {issue}"), StyleType::Error));
    }
}

pub async fn run(router: &ConversionRouter, json: bool) -> Result<()> {
    let report = health_check(router).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    display_report(&report);
    ui::print_separator();
    display_stats(&report.performance);
    Ok(())
}
