//! offercraft: Core library for revising commercial price offers
//!
//! An offer is an XLSX workbook whose active sheet lists line items
//! (quantity, unit label, unit price, subtotal) grouped in sections closed by
//! subtotal rows, followed by a `TOTAL OFERTA` row. Processing raises every
//! unprotected price by a random percentage, recomputes line subtotals,
//! section subtotals and the grand total, normalizes unit labels and bumps
//! the revision marker of the title. Everything else in the package is
//! preserved.

pub mod config;
pub mod error;
pub mod reader;
pub mod revision;
pub mod stats;
pub mod transform;
pub mod writer;

use std::path::Path;

pub use config::ProcessorConfig;
pub use error::{OfferError, Result};
pub use stats::RunStatistics;
pub use transform::{FixedIncrease, IncreaseSource, RandomIncrease, RowKind, classify_row};

use reader::OfferWorkbook;

/// A processed offer: the new document plus what changed
#[derive(Debug, Clone)]
pub struct ProcessedOffer {
    pub document: Vec<u8>,
    pub statistics: RunStatistics,
}

/// Main processing interface
#[derive(Debug, Clone, Default)]
pub struct OfferProcessor {
    config: ProcessorConfig,
}

impl OfferProcessor {
    /// Create a new processor with default configuration
    pub fn new() -> Self {
        Self::with_config(ProcessorConfig::default())
    }

    /// Create a new processor with custom configuration
    pub fn with_config(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Process document bytes, drawing increases from the thread-local RNG
    pub fn process(&self, document: &[u8], max_increase_percent: f64) -> Result<ProcessedOffer> {
        self.process_with(
            document,
            max_increase_percent,
            &mut RandomIncrease::from_entropy(),
        )
    }

    /// Process document bytes with an explicit increase source
    pub fn process_with<S: IncreaseSource + ?Sized>(
        &self,
        document: &[u8],
        max_increase_percent: f64,
        source: &mut S,
    ) -> Result<ProcessedOffer> {
        self.config.validate()?;
        self.config.check_increase(max_increase_percent)?;

        let mut workbook = OfferWorkbook::from_bytes(document)?;
        log::info!(
            "Processing sheet '{}' with increases in [{}%, {}%]",
            workbook.sheet_name,
            self.config.min_increase_percent,
            max_increase_percent
        );
        let statistics =
            transform::run(&mut workbook, &self.config, max_increase_percent, source)?;
        let document = writer::write_workbook(workbook)?;

        Ok(ProcessedOffer {
            document,
            statistics,
        })
    }

    /// Read `input`, process it and write the result to `output`
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>, S: IncreaseSource + ?Sized>(
        &self,
        input: P,
        output: Q,
        max_increase_percent: f64,
        source: &mut S,
    ) -> Result<RunStatistics> {
        let document = reader::read_document(input)?;
        let processed = self.process_with(&document, max_increase_percent, source)?;
        writer::save_document(output, &processed.document)?;
        Ok(processed.statistics)
    }
}

/// Process document bytes with the default configuration
pub fn process(document: &[u8], max_increase_percent: f64) -> Result<ProcessedOffer> {
    OfferProcessor::new().process(document, max_increase_percent)
}
