//! The offer transformation pass
//!
//! One top-down scan classifies every row, rewrites line items and collects
//! subtotal rows with the line subtotals of the section above them. Subtotal
//! rows are then written, and their sum goes into the first `TOTAL OFERTA`
//! row.

pub mod classify;
pub mod increase;
pub mod units;

pub use classify::{GrandTotalRow, LineItem, RowKind, SkipReason, SubtotalRow, classify_row};
pub use increase::{FixedIncrease, IncreaseSource, RandomIncrease, apply_increase};
pub use units::{UnitFormatter, round2};

use std::collections::HashSet;

use crate::config::ProcessorConfig;
use crate::error::Result;
use crate::reader::OfferWorkbook;
use crate::reader::parser_utils::cell_ref;
use crate::revision;
use crate::stats::RunStatistics;

/// Line items accumulated since the last subtotal row
#[derive(Debug, Default)]
enum Section {
    #[default]
    Closed,
    Open {
        first_row: u32,
        subtotals: Vec<f64>,
    },
}

impl Section {
    fn push(&mut self, row: u32, subtotal: f64) {
        match self {
            Section::Closed => {
                *self = Section::Open {
                    first_row: row,
                    subtotals: vec![subtotal],
                }
            }
            Section::Open { subtotals, .. } => subtotals.push(subtotal),
        }
    }

    /// Close the section, returning its line subtotals
    fn close(&mut self) -> Vec<f64> {
        match std::mem::take(self) {
            Section::Closed => Vec::new(),
            Section::Open {
                first_row,
                subtotals,
            } => {
                log::debug!(
                    "Closing section opened at row {} with {} line items",
                    first_row + 1,
                    subtotals.len()
                );
                subtotals
            }
        }
    }
}

/// A subtotal row waiting for its value
struct PendingSubtotal {
    row: SubtotalRow,
    line_subtotals: Vec<f64>,
}

/// Apply the whole transformation to `workbook`.
///
/// `max_increase_percent` must already be checked against the configured
/// minimum.
pub fn run<S: IncreaseSource + ?Sized>(
    workbook: &mut OfferWorkbook<'_>,
    config: &ProcessorConfig,
    max_increase_percent: f64,
    source: &mut S,
) -> Result<RunStatistics> {
    let units = UnitFormatter::new(&config.unit_suffix)?;
    let mut stats = RunStatistics::default();

    // Revision label
    let (title_row, title_col) = config.title_position()?;
    let (title_row, title_col) = workbook.sheet.resolve(title_row, title_col);
    stats.previous_label = workbook.sheet.value(title_row, title_col).display_text();
    stats.new_label = revision::bump(&stats.previous_label);
    workbook.sheet.set_text(title_row, title_col, &stats.new_label);
    log::info!(
        "Revision label at {}: '{}' -> '{}'",
        cell_ref(title_row, title_col),
        stats.previous_label,
        stats.new_label
    );

    // Line items
    let mut section = Section::default();
    let mut pending: Vec<PendingSubtotal> = Vec::new();
    let mut grand_total: Option<GrandTotalRow> = None;
    let mut mutated_prices: HashSet<(u32, u32)> = HashSet::new();

    let last_row = workbook.sheet.last_row().unwrap_or(0);
    for row in 0..=last_row {
        match classify_row(&workbook.sheet, &workbook.styles, row) {
            RowKind::Skip(SkipReason::MissingValues) => {}
            RowKind::Skip(reason) => {
                log::debug!("Row {}: skipped ({})", row + 1, reason.as_str());
            }
            RowKind::Subtotal(subtotal) => {
                log::debug!("Row {}: subtotal '{}'", row + 1, subtotal.label);
                pending.push(PendingSubtotal {
                    row: subtotal,
                    line_subtotals: section.close(),
                });
            }
            RowKind::GrandTotal(total) => {
                if grand_total.is_none() {
                    log::debug!("Row {}: grand total", row + 1);
                    grand_total = Some(total);
                }
            }
            RowKind::LineItem(item) => {
                if !mutated_prices.insert(item.price_cell) {
                    log::debug!(
                        "Row {}: price {} already updated",
                        row + 1,
                        cell_ref(item.price_cell.0, item.price_cell.1)
                    );
                    continue;
                }
                let subtotal = rewrite_line_item(
                    workbook,
                    config,
                    &units,
                    &item,
                    max_increase_percent,
                    source,
                    &mut stats,
                );
                section.push(item.row, subtotal);
            }
        }
    }

    // Section subtotals
    let mut section_totals = Vec::with_capacity(pending.len());
    for PendingSubtotal {
        row,
        line_subtotals,
    } in pending
    {
        let value = round2(line_subtotals.iter().sum());
        let (target_row, target_col) = row.target;
        let style = currency_style(workbook, config, row.target);
        workbook
            .sheet
            .set_number(target_row, target_col, value, Some(style));
        log::debug!(
            "{}: '{}' = {} (was formatted as {:?})",
            cell_ref(target_row, target_col),
            row.label,
            value,
            row.number_format
        );
        stats.recalculated_subtotals += 1;
        section_totals.push(value);
    }

    // Grand total
    match grand_total {
        Some(total) => {
            let value = round2(section_totals.iter().sum());
            let (target_row, target_col) = total.target;
            let style = currency_style(workbook, config, total.target);
            workbook
                .sheet
                .set_number(target_row, target_col, value, Some(style));
            stats.grand_total = Some(value);
        }
        None => log::warn!("No 'TOTAL OFERTA' row found; grand total not written"),
    }

    log::info!(
        "Updated {} prices, {} subtotals and {} unit labels",
        stats.modified_prices,
        stats.recalculated_subtotals,
        stats.formatted_units
    );

    Ok(stats)
}

/// Rewrite unit label, price and subtotal of one line item. Returns the new
/// line subtotal.
fn rewrite_line_item<S: IncreaseSource + ?Sized>(
    workbook: &mut OfferWorkbook<'_>,
    config: &ProcessorConfig,
    units: &UnitFormatter,
    item: &LineItem,
    max_increase_percent: f64,
    source: &mut S,
    stats: &mut RunStatistics,
) -> f64 {
    let sheet = &mut workbook.sheet;
    let styles = &mut workbook.styles;

    let (unit_row, unit_col) = item.unit_cell;
    let label = sheet.value(unit_row, unit_col);
    match units.quantity_of(label, item.quantity) {
        Some(quantity) => {
            sheet.set_text(unit_row, unit_col, &units.render(quantity));
            stats.formatted_units += 1;
        }
        None => log::warn!(
            "Row {}: unit label '{}' at {} is not a quantity; left unchanged",
            item.row + 1,
            label.display_text(),
            cell_ref(unit_row, unit_col)
        ),
    }

    let percent = source.next_percent(config.min_increase_percent, max_increase_percent);
    let new_price = apply_increase(item.price, percent);
    let (price_row, price_col) = item.price_cell;
    let style =
        styles.with_number_format(sheet.style_index(price_row, price_col), &config.price_format);
    sheet.set_number(price_row, price_col, new_price, Some(style));
    stats.modified_prices += 1;

    let subtotal = round2(item.quantity * new_price);
    let (subtotal_row, subtotal_col) = item.subtotal_cell;
    let style = styles.with_number_format(
        sheet.style_index(subtotal_row, subtotal_col),
        &config.price_format,
    );
    sheet.set_number(subtotal_row, subtotal_col, subtotal, Some(style));

    log::debug!(
        "Row {}: price {} -> {} (+{:.2}%), subtotal {} x {} = {}",
        item.row + 1,
        item.price,
        new_price,
        percent,
        item.quantity,
        new_price,
        subtotal
    );

    subtotal
}

fn currency_style(
    workbook: &mut OfferWorkbook<'_>,
    config: &ProcessorConfig,
    cell: (u32, u32),
) -> u32 {
    let xf = workbook.sheet.style_index(cell.0, cell.1);
    workbook.styles.with_number_format(xf, &config.currency_format)
}
