// ! Writer module for producing the revised offer package

mod xlsx_writer;

pub use xlsx_writer::write_workbook_xlsx;

use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::reader::OfferWorkbook;

/// Serialize the workbook to bytes
pub fn write_workbook(workbook: OfferWorkbook<'_>) -> Result<Vec<u8>> {
    write_workbook_xlsx(workbook)
}

/// Write serialized document bytes to `output_path`
pub fn save_document<P: AsRef<Path>>(output_path: P, document: &[u8]) -> Result<()> {
    fs::write(output_path.as_ref(), document)?;
    Ok(())
}
