//! XLSX package reader for offer workbooks

use std::fs;
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

pub mod merged;
pub mod parser_utils;
pub mod styles;
pub mod workbook;
pub mod xlsx_parser;

pub use merged::MergeMap;
pub use styles::{Fill, FillColor, Stylesheet};
pub use workbook::{Cell, CellValue, SharedFormula, Worksheet};

use crate::error::{OfferError, Result};
use self::xlsx_parser::{STYLES_PART, active_sheet_path, extract_shared_strings, read_part};

/// An offer workbook loaded from an XLSX/XLSM package.
///
/// Only the active sheet and the stylesheet are parsed; every other part
/// stays in the archive and is copied unchanged when the workbook is written.
pub struct OfferWorkbook<'a> {
    pub(crate) archive: ZipArchive<Cursor<&'a [u8]>>,
    pub sheet_name: String,
    pub sheet: Worksheet,
    pub styles: Stylesheet,
}

impl<'a> OfferWorkbook<'a> {
    /// Load a workbook from the raw bytes of the package
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;

        let (sheet_name, sheet_path) = active_sheet_path(&mut archive)?;
        let shared_strings = extract_shared_strings(&mut archive)?;
        let sheet_xml = read_part(&mut archive, &sheet_path)?;
        let sheet = Worksheet::parse(&sheet_path, &sheet_xml, &shared_strings)?;
        let styles = Stylesheet::parse(&read_part(&mut archive, STYLES_PART)?)?;

        log::debug!(
            "Loaded sheet '{}' from {} ({} shared strings, {} merged ranges)",
            sheet_name,
            sheet_path,
            shared_strings.len(),
            sheet.merges().ranges().len()
        );

        Ok(Self {
            archive,
            sheet_name,
            sheet,
            styles,
        })
    }
}

/// Read a workbook file into memory, checking its extension
pub fn read_document<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path_ref = path.as_ref();

    let is_xlsx = path_ref
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("xlsx") || s.eq_ignore_ascii_case("xlsm"))
        .unwrap_or(false);
    if !is_xlsx {
        return Err(OfferError::InvalidFormat(format!(
            "Unsupported file format: {}",
            path_ref.display()
        )));
    }

    Ok(fs::read(path_ref)?)
}
