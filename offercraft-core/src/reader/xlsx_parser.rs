//! XML parsing utilities for locating parts inside an XLSX package

use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};
use zip::ZipArchive;

use super::parser_utils::read_text_node;
use crate::error::{OfferError, Result};

pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const STYLES_PART: &str = "xl/styles.xml";
pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
pub const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Read a whole part as UTF-8 text
pub fn read_part(archive: &mut ZipArchive<impl Read + Seek>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .map_err(|_| OfferError::MissingPart(name.to_string()))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

/// A `<sheet>` entry of `xl/workbook.xml`
#[derive(Debug, Clone)]
pub struct SheetEntry {
    pub name: String,
    pub rel_id: String,
}

/// Sheet entries in workbook order plus the active tab index
pub fn parse_sheet_entries(workbook_xml: &str) -> Result<(Vec<SheetEntry>, usize)> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut sheets = Vec::new();
    let mut active_tab = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = String::new();
                    let mut rel_id = String::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
                        // r:id, whatever prefix the relationships namespace got
                        if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
                            rel_id = value.to_string();
                        } else if attr.key.as_ref() == b"name" {
                            name = value.to_string();
                        }
                    }
                    sheets.push(SheetEntry { name, rel_id });
                }
                b"workbookView" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"activeTab" {
                            let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
                            active_tab = value.trim().parse().unwrap_or(0);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((sheets, active_tab))
}

/// Map of relationship id to target path from a `.rels` part
pub fn parse_relationships(rels_xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    let mut rels = HashMap::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut target = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => {
                            id = attr
                                .unescape_value()
                                .map_err(quick_xml::Error::from)?
                                .to_string()
                        }
                        b"Target" => {
                            target = attr
                                .unescape_value()
                                .map_err(quick_xml::Error::from)?
                                .to_string()
                        }
                        _ => {}
                    }
                }
                rels.insert(id, target);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rels)
}

/// Turn a workbook relationship target into a package part name
pub fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{}", target.trim_start_matches("./"))
    }
}

/// Resolve the active sheet (the one a spreadsheet application opens on) to
/// its name and XML path in the package
pub fn active_sheet_path(archive: &mut ZipArchive<impl Read + Seek>) -> Result<(String, String)> {
    let workbook_xml = read_part(archive, WORKBOOK_PART)?;
    let (sheets, active_tab) = parse_sheet_entries(&workbook_xml)?;
    if sheets.is_empty() {
        return Err(OfferError::InvalidFormat(
            "workbook contains no sheets".to_string(),
        ));
    }
    let sheet = sheets.get(active_tab).unwrap_or(&sheets[0]);

    let rels = parse_relationships(&read_part(archive, WORKBOOK_RELS_PART)?)?;
    let target = rels.get(&sheet.rel_id).ok_or_else(|| {
        OfferError::InvalidFormat(format!(
            "Relationship '{}' not found for sheet '{}'",
            sheet.rel_id, sheet.name
        ))
    })?;

    Ok((sheet.name.clone(), resolve_target(target)))
}

/// Extract the shared string table. Rich text runs are concatenated and
/// phonetic runs are skipped.
pub fn extract_shared_strings(archive: &mut ZipArchive<impl Read + Seek>) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name(SHARED_STRINGS_PART) {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    let mut buf = Vec::new();
    let mut current_string = String::new();
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" if !in_phonetic => current_string.push_str(&read_text_node(&mut reader)?),
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current_string));
                }
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}
