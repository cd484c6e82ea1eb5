//! Decimal parsing, rounding and unit-label rendering

use regex::Regex;

use crate::error::{OfferError, Result};
use crate::reader::CellValue;

/// Round half away from zero to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a decimal that may use a comma as decimal separator
pub fn parse_decimal(text: &str) -> Option<f64> {
    let normalized = text.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Numeric value of a cell: numbers as stored, text parsed with a dot as
/// decimal separator. Formula cells are never numeric.
pub fn numeric_value(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Two decimals with a comma separator, e.g. `3,50`
pub fn format_decimal_comma(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}

/// Rewrites unit-quantity labels such as `5 Ud` into `5,00ud`
#[derive(Debug, Clone)]
pub struct UnitFormatter {
    suffix: String,
    pattern: Regex,
}

impl UnitFormatter {
    pub fn new(suffix: &str) -> Result<Self> {
        let pattern = Regex::new(&format!("(?i){}", regex::escape(suffix)))
            .map_err(|e| OfferError::Config(format!("invalid unit suffix '{suffix}': {e}")))?;
        Ok(Self {
            suffix: suffix.to_string(),
            pattern,
        })
    }

    /// Quantity carried by a unit label, or `fallback` when the label is empty.
    /// `None` when the label cannot be read as a number.
    pub fn quantity_of(&self, label: &CellValue, fallback: f64) -> Option<f64> {
        match label {
            CellValue::Empty => Some(fallback),
            CellValue::Number(n) => Some(*n),
            CellValue::Text(text) => {
                let stripped = self.pattern.replace_all(text, "");
                let stripped = stripped.trim();
                if stripped.is_empty() {
                    Some(fallback)
                } else {
                    parse_decimal(stripped)
                }
            }
            _ => None,
        }
    }

    pub fn render(&self, quantity: f64) -> String {
        format!("{}{}", format_decimal_comma(quantity), self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(10.004), 10.0);
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(30.5), 30.5);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("12,5"), Some(12.5));
        assert_eq!(parse_decimal(" 3.25 "), Some(3.25));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(numeric_value(&CellValue::Number(4.0)), Some(4.0));
        assert_eq!(numeric_value(&text(" 7.5")), Some(7.5));
        // Comma decimals are only read from unit labels
        assert_eq!(numeric_value(&text("7,5")), None);
        assert_eq!(numeric_value(&text("inf")), None);
        assert_eq!(numeric_value(&CellValue::Empty), None);
        let formula = CellValue::Formula {
            formula: "A1*2".to_string(),
            cached: Some("8".to_string()),
        };
        assert_eq!(numeric_value(&formula), None);
    }

    #[test]
    fn test_unit_labels() {
        let units = UnitFormatter::new("ud").unwrap();
        assert_eq!(units.quantity_of(&text("5 Ud"), 1.0), Some(5.0));
        assert_eq!(units.quantity_of(&text("2,5UD"), 1.0), Some(2.5));
        assert_eq!(units.quantity_of(&text("uD"), 3.0), Some(3.0));
        assert_eq!(units.quantity_of(&CellValue::Empty, 4.0), Some(4.0));
        assert_eq!(units.quantity_of(&CellValue::Number(6.0), 1.0), Some(6.0));
        assert_eq!(units.quantity_of(&text("m2"), 1.0), None);

        assert_eq!(units.render(5.0), "5,00ud");
        assert_eq!(units.render(2.5), "2,50ud");
    }

    #[test]
    fn test_custom_suffix() {
        let units = UnitFormatter::new("u.").unwrap();
        assert_eq!(units.quantity_of(&text("3 U."), 1.0), Some(3.0));
        // the dot is literal, not a wildcard
        assert_eq!(units.quantity_of(&text("3 ux"), 1.0), None);
        assert_eq!(units.render(3.0), "3,00u.");
    }
}
