//! Output formatters for run statistics

use anyhow::Result;
use colored::*;
use offercraft_core::RunStatistics;
use std::path::Path;

/// Print statistics in human-readable format with colors
pub fn print_human(input: &Path, output: &Path, stats: &RunStatistics, dry_run: bool) {
    println!("{}", format!("Offer: {}", input.display()).bold());
    println!();

    println!("{}", "Changes:".bold().underline());
    println!("  {} {}", "Modified prices:".bold(), stats.modified_prices);
    println!(
        "  {} {}",
        "Recalculated subtotals:".bold(),
        stats.recalculated_subtotals
    );
    println!("  {} {}", "Formatted units:".bold(), stats.formatted_units);
    println!();

    println!("{}", "Revision:".bold().underline());
    println!("  {} {}", "Previous:".bold(), stats.previous_label.bright_black());
    println!("  {} {}", "New:".bold(), stats.new_label.cyan().bold());

    if let Some(total) = stats.formatted_total() {
        println!();
        println!("{} {}", "TOTAL OFERTA:".bold(), total.green().bold());
    }

    println!();
    if dry_run {
        println!(
            "{} {}",
            "[DRY RUN] Output would be:".yellow().bold(),
            output.display()
        );
    } else {
        println!("{}", "✓ Offer processed".green().bold());
        println!("Output: {}", output.display());
    }
}

/// Print statistics in JSON format
pub fn print_json(output: &Path, stats: &RunStatistics, dry_run: bool) -> Result<()> {
    let mut value = serde_json::to_value(stats)?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "output".to_string(),
            serde_json::Value::String(output.display().to_string()),
        );
        object.insert("dry_run".to_string(), serde_json::Value::Bool(dry_run));
    }

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
