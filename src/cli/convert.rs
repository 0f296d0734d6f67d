use super::ui::{self, StyleType};
use crate::batch::{BatchSummary, convert_batch, parse_batch_item};
use crate::core::config::BatchConfig;
use crate::core::conversion::{ConversionRequest, ConversionResult};
use crate::router::ConversionRouter;
use anyhow::Result;
use comfy_table::{Cell, Table};

fn result_table(results: &[ConversionResult]) -> Table {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Converted"),
        ui::header_cell("Method"),
        ui::header_cell("Confidence"),
        ui::header_cell("Cached"),
        ui::header_cell("Latency"),
    ]);

    for result in results {
        table.add_row(vec![
            Cell::new(&result.pair),
            ui::format_optional_cell(result.rate, ui::format_rate),
            ui::format_optional_cell(result.converted_amount, ui::format_rate),
            Cell::new(result.method.to_string()),
            ui::confidence_cell(result.confidence),
            Cell::new(if result.cached { "yes" } else { "no" }),
            Cell::new(format!("{:.1} ms", result.latency.as_secs_f64() * 1000.0)),
        ]);
    }
    table
}

fn print_notes(results: &[ConversionResult]) {
    for result in results {
        if let Some(error) = &result.error {
            let style_type = if result.is_success() {
                StyleType::Subtle
            } else {
                StyleType::Error
            };
            println!("{}", ui::style_text(&format!("{}: {}", result.pair, error), style_type));
        }
    }
}

pub async fn run(
    router: &ConversionRouter,
    from: &str,
    to: &str,
    amount: f64,
    json: bool,
) -> Result<()> {
    let result = router.convert(from, to, amount).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", ui::style_text("Conversion", StyleType::Title));
    match (result.rate, result.converted_amount) {
        (Some(_), Some(converted)) => println!(
            "{} {} = {}",
            amount,
            from.to_uppercase(),
            ui::style_text(
                &format!("{} {}", ui::format_rate(converted), to.to_uppercase()),
                StyleType::Good
            )
        ),
        _ => println!("{}", ui::style_text("No rate available", StyleType::Error)),
    }

    let results = [result];
    println!("{}", result_table(&results));
    if !results[0].bridge_rates.is_empty() {
        let legs: Vec<String> = results[0]
            .bridge_rates
            .iter()
            .map(|leg| format!("{} @ {}", leg.pair, ui::format_rate(leg.rate)))
            .collect();
        println!("{} {}", ui::style_text("Legs:", StyleType::Label), legs.join(" → "));
    }
    print_notes(&results);
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!(
        "{} {}/{} successful ({:.1}%) in {:.2}s",
        ui::style_text("Batch:", StyleType::Label),
        summary.successful,
        summary.total,
        summary.success_rate * 100.0,
        summary.elapsed.as_secs_f64()
    );
}

pub async fn run_batch(
    router: &ConversionRouter,
    items: &[String],
    config: &BatchConfig,
    json: bool,
    show_stats: bool,
) -> Result<()> {
    let requests = items
        .iter()
        .map(|item| parse_batch_item(item))
        .collect::<Result<Vec<ConversionRequest>>>()?;

    let pb = ui::new_progress_bar(requests.len() as u64);
    let on_complete = {
        let pb = pb.clone();
        move || pb.inc(1)
    };
    let outcome = convert_batch(
        router,
        &requests,
        config.max_size,
        config.concurrency,
        &on_complete,
    )
    .await;
    pb.finish_and_clear();
    let (results, summary) = outcome?;

    if json {
        let payload = serde_json::json!({
            "results": results,
            "summary": summary,
            "performance": show_stats.then(|| router.get_performance_stats()),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("{}", ui::style_text("Batch Conversion", StyleType::Title));
    println!("{}", result_table(&results));
    print_notes(&results);
    print_summary(&summary);

    if show_stats {
        ui::print_separator();
        super::health::display_stats(&router.get_performance_stats());
    }
    Ok(())
}
