use super::ui::{self, StyleType};
use crate::core::asset::{AssetCatalog, AssetKind};
use anyhow::Result;

const SYMBOLS_PER_LINE: usize = 12;

fn print_symbols(title: &str, symbols: &[&str]) {
    println!(
        "{} {}",
        ui::style_text(title, StyleType::Title),
        ui::style_text(&format!("({})", symbols.len()), StyleType::Subtle)
    );
    for line in symbols.chunks(SYMBOLS_PER_LINE) {
        println!("  {}", line.join(" "));
    }
}

pub fn run(catalog: &AssetCatalog) -> Result<()> {
    print_symbols("Crypto assets", &catalog.symbols(AssetKind::Crypto));
    println!();
    print_symbols("Fiat currencies", &catalog.symbols(AssetKind::Fiat));

    println!(
        "\n{} {} ordered pairs",
        ui::style_text("Supported:", StyleType::Label),
        catalog.supported_pairs().len()
    );
    Ok(())
}
