//! Row classification for offer sheets
//!
//! Column convention (0-based): A quantity or section marker, B unit label,
//! E unit price, F subtotal. The grand total goes in column E of the
//! `TOTAL OFERTA` row.

use crate::reader::{Stylesheet, Worksheet};

use super::units::numeric_value;

pub const QUANTITY_COL: u32 = 0;
pub const UNIT_COL: u32 = 1;
pub const PRICE_COL: u32 = 4;
pub const SUBTOTAL_COL: u32 = 5;
pub const GRAND_TOTAL_COL: u32 = 4;

const GRAND_TOTAL_MARKER: &str = "TOTAL OFERTA";

/// Why a row is left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Unit price or subtotal is empty
    MissingValues,
    NonNumericPrice,
    NonPositivePrice,
    /// The price cell is highlighted
    ProtectedPrice,
}

impl SkipReason {
    pub fn as_str(&self) -> &str {
        match self {
            SkipReason::MissingValues => "missing price or subtotal",
            SkipReason::NonNumericPrice => "non-numeric price",
            SkipReason::NonPositivePrice => "non-positive price",
            SkipReason::ProtectedPrice => "protected price",
        }
    }
}

/// A priced row whose price and subtotal get rewritten.
/// Cell coordinates are resolved merge anchors.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    pub row: u32,
    pub quantity: f64,
    pub unit_cell: (u32, u32),
    pub price_cell: (u32, u32),
    pub price: f64,
    pub subtotal_cell: (u32, u32),
}

/// A section subtotal row
#[derive(Debug, Clone, PartialEq)]
pub struct SubtotalRow {
    pub row: u32,
    pub label: String,
    pub target: (u32, u32),
    /// Number format of the target before processing
    pub number_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrandTotalRow {
    pub row: u32,
    pub target: (u32, u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowKind {
    Skip(SkipReason),
    LineItem(LineItem),
    Subtotal(SubtotalRow),
    GrandTotal(GrandTotalRow),
}

/// Marker text of a grand total row, e.g. `TOTAL OFERTA (IVA no incluido)`
pub fn is_grand_total_marker(text: &str) -> bool {
    text.to_uppercase().contains(GRAND_TOTAL_MARKER)
}

/// Marker text of a section subtotal row, e.g. `Total capítulo 1`
pub fn is_subtotal_marker(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.contains("total") && !lower.contains("oferta")
}

/// Classify a 0-based row of the sheet
pub fn classify_row(sheet: &Worksheet, styles: &Stylesheet, row: u32) -> RowKind {
    let quantity_cell = sheet.resolve(row, QUANTITY_COL);
    let marker = sheet.value(quantity_cell.0, quantity_cell.1).display_text();

    if is_grand_total_marker(&marker) {
        return RowKind::GrandTotal(GrandTotalRow {
            row,
            target: sheet.resolve(row, GRAND_TOTAL_COL),
        });
    }

    if is_subtotal_marker(&marker) {
        let target = sheet.resolve(row, SUBTOTAL_COL);
        return RowKind::Subtotal(SubtotalRow {
            row,
            label: marker.trim().to_string(),
            target,
            number_format: styles.format_code(sheet.style_index(target.0, target.1)),
        });
    }

    let price_cell = sheet.resolve(row, PRICE_COL);
    let subtotal_cell = sheet.resolve(row, SUBTOTAL_COL);
    let price_value = sheet.value(price_cell.0, price_cell.1);
    if price_value.is_blank() || sheet.value(subtotal_cell.0, subtotal_cell.1).is_blank() {
        return RowKind::Skip(SkipReason::MissingValues);
    }

    let Some(price) = numeric_value(price_value) else {
        return RowKind::Skip(SkipReason::NonNumericPrice);
    };
    // NaN fails this comparison too
    if !(price > 0.0) {
        return RowKind::Skip(SkipReason::NonPositivePrice);
    }
    if styles.is_highlighted(sheet.style_index(price_cell.0, price_cell.1)) {
        return RowKind::Skip(SkipReason::ProtectedPrice);
    }

    let quantity = numeric_value(sheet.value(quantity_cell.0, quantity_cell.1))
        .filter(|q| *q != 0.0)
        .unwrap_or(1.0);

    RowKind::LineItem(LineItem {
        row,
        quantity,
        unit_cell: sheet.resolve(row, UNIT_COL),
        price_cell,
        price,
        subtotal_cell,
    })
}
