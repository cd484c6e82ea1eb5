//! Configuration for offer processing

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{OfferError, Result};
use crate::reader::parser_utils::parse_cell_ref;

/// Processor configuration, usually loaded from `offercraft.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Cell holding the revision label
    pub title_cell: String,
    /// Lower bound of every increase draw, in percent
    pub min_increase_percent: f64,
    /// Largest maximum increase accepted from the command line
    pub max_increase_limit: f64,
    /// Number format for rewritten prices and line subtotals
    pub price_format: String,
    /// Number format for section subtotals and the grand total
    pub currency_format: String,
    /// Suffix of unit-quantity labels
    pub unit_suffix: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            title_cell: "B8".to_string(),
            min_increase_percent: 1.0,
            max_increase_limit: 20.0,
            price_format: "0.00".to_string(),
            currency_format: "#,##0.00 \"€\"".to_string(),
            unit_suffix: "ud".to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ProcessorConfig =
            toml::from_str(content).map_err(|e| OfferError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> Result<()> {
        self.title_position()?;

        if !self.min_increase_percent.is_finite() || self.min_increase_percent < 0.0 {
            return Err(OfferError::Config(format!(
                "min_increase_percent must be a non-negative number, got {}",
                self.min_increase_percent
            )));
        }
        if !self.max_increase_limit.is_finite()
            || self.max_increase_limit < self.min_increase_percent
        {
            return Err(OfferError::Config(format!(
                "max_increase_limit ({}) must not be below min_increase_percent ({})",
                self.max_increase_limit, self.min_increase_percent
            )));
        }

        for (key, value) in [
            ("price_format", &self.price_format),
            ("currency_format", &self.currency_format),
            ("unit_suffix", &self.unit_suffix),
        ] {
            if value.trim().is_empty() {
                return Err(OfferError::Config(format!("{key} must not be empty")));
            }
        }

        Ok(())
    }

    /// 0-based (row, column) of the title cell
    pub fn title_position(&self) -> Result<(u32, u32)> {
        parse_cell_ref(self.title_cell.trim()).ok_or_else(|| {
            OfferError::Config(format!("invalid title_cell '{}'", self.title_cell))
        })
    }

    /// Check a maximum increase against the lower bound
    pub fn check_increase(&self, max_increase_percent: f64) -> Result<()> {
        if !max_increase_percent.is_finite() || max_increase_percent < self.min_increase_percent {
            return Err(OfferError::InvalidIncrease {
                max: max_increase_percent,
                min: self.min_increase_percent,
            });
        }
        Ok(())
    }
}
