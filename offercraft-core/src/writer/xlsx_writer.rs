// ! XLSX writer: re-emits the package with the rewritten sheet and styles

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::{Cursor, Read, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::Result;
use crate::reader::OfferWorkbook;
use crate::reader::workbook::namespace_prefix;
use crate::reader::xlsx_parser::{
    CALC_CHAIN_PART, CONTENT_TYPES_PART, STYLES_PART, WORKBOOK_PART, WORKBOOK_RELS_PART,
    resolve_target,
};

/// Children of `<workbook>` that come after `<calcPr>`
const AFTER_CALC_PR: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

/// Serialize a workbook back into XLSX bytes.
///
/// Parts are written in their original order. Only the active sheet and the
/// stylesheet are regenerated, and only when they were modified. When a
/// formula was overwritten the calculation chain is dropped, together with
/// its relationship and content-type override, so that the spreadsheet
/// application rebuilds it. A modified sheet also marks the workbook for a
/// full recalculation on load, so formulas that read rewritten cells do not
/// show stale cached results.
pub fn write_workbook_xlsx(workbook: OfferWorkbook<'_>) -> Result<Vec<u8>> {
    let OfferWorkbook {
        mut archive,
        sheet,
        styles,
        ..
    } = workbook;
    let drop_calc_chain = sheet.formulas_replaced();

    let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();

        if file.is_dir() {
            zip_writer.add_directory(name.as_str(), options)?;
            continue;
        }

        if drop_calc_chain && name == CALC_CHAIN_PART {
            log::debug!("Dropping {} after replacing formulas", name);
            continue;
        }

        let replacement = if name == sheet.path && sheet.is_modified() {
            Some(sheet.to_xml())
        } else if name == STYLES_PART && styles.is_modified() {
            Some(styles.to_xml())
        } else if sheet.is_modified() && name == WORKBOOK_PART {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Some(force_full_calc_on_load(&content)?)
        } else if drop_calc_chain && name == CONTENT_TYPES_PART {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Some(remove_content_type_override(
                &content,
                &format!("/{CALC_CHAIN_PART}"),
            )?)
        } else if drop_calc_chain && name == WORKBOOK_RELS_PART {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Some(remove_relationships_to(&content, CALC_CHAIN_PART)?)
        } else {
            None
        };

        zip_writer.start_file(name.as_str(), options)?;
        match replacement {
            Some(content) => zip_writer.write_all(content.as_bytes())?,
            None => {
                // Copy file as is
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)?;
                zip_writer.write_all(&buffer)?;
            }
        }
    }

    let cursor = zip_writer.finish()?;
    Ok(cursor.into_inner())
}

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, inserting the element in schema
/// order when the workbook has none
fn force_full_calc_on_load(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth = 0usize;
    let mut prefix = String::new();
    let mut marked = false;

    loop {
        let event = reader.read_event()?;
        let insert_here = !marked
            && depth == 1
            && match &event {
                Event::Start(e) | Event::Empty(e) => {
                    AFTER_CALC_PR.contains(&e.local_name().as_ref())
                }
                Event::End(e) => e.local_name().as_ref() == b"workbook",
                _ => false,
            };
        if insert_here {
            let calc_pr = BytesStart::new(format!("{prefix}calcPr"))
                .with_attributes([("fullCalcOnLoad", "1")]);
            writer.write_event(Event::Empty(calc_pr))?;
            marked = true;
        }

        match event {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    prefix = namespace_prefix(e.name().as_ref());
                }
                writer.write_event(Event::Start(mark_calc_pr(e, &mut marked)?))?;
            }
            Event::Empty(e) => writer.write_event(Event::Empty(mark_calc_pr(e, &mut marked)?))?,
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

fn mark_calc_pr<'a>(e: BytesStart<'a>, marked: &mut bool) -> Result<BytesStart<'a>> {
    if e.local_name().as_ref() != b"calcPr" {
        return Ok(e);
    }
    let mut calc_pr = BytesStart::new(String::from_utf8(e.name().as_ref().to_vec())?);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() != b"fullCalcOnLoad" {
            calc_pr.push_attribute(attr);
        }
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    *marked = true;
    Ok(calc_pr)
}

/// Remove the `<Override>` for `part_name` from `[Content_Types].xml`
fn remove_content_type_override(xml: &str, part_name: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.local_name().as_ref() == b"Override" => {
                let mut current = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"PartName" {
                        current = String::from_utf8(attr.value.to_vec())?;
                        break;
                    }
                }

                if !current.eq_ignore_ascii_case(part_name) {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

/// Remove every relationship whose target resolves to `part_name`
fn remove_relationships_to(xml: &str, part_name: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut target = String::new();
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.as_ref() == b"Target" {
                        target = String::from_utf8(attr.value.to_vec())?;
                        break;
                    }
                }

                if resolve_target(&target) != part_name {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Eof => break,
            e => writer.write_event(e)?,
        }
        buf.clear();
    }

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_calc_chain_content_type() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/></Types>"#;
        let out = remove_content_type_override(xml, "/xl/calcChain.xml").unwrap();
        assert!(!out.contains("calcChain"));
        assert!(out.contains(r#"PartName="/xl/workbook.xml""#));
    }

    #[test]
    fn test_full_calc_on_load_updates_existing_calc_pr() {
        let xml = r#"<workbook xmlns="x"><sheets><sheet name="Oferta" sheetId="1"/></sheets><calcPr calcId="191029" fullCalcOnLoad="0"/><extLst/></workbook>"#;
        let out = force_full_calc_on_load(xml).unwrap();
        assert_eq!(
            out,
            r#"<workbook xmlns="x"><sheets><sheet name="Oferta" sheetId="1"/></sheets><calcPr calcId="191029" fullCalcOnLoad="1"/><extLst/></workbook>"#
        );
    }

    #[test]
    fn test_full_calc_on_load_inserts_calc_pr_in_order() {
        let xml = r#"<x:workbook xmlns:x="x"><x:sheets/><x:definedNames/><x:extLst><x:ext/></x:extLst></x:workbook>"#;
        let out = force_full_calc_on_load(xml).unwrap();
        assert_eq!(
            out,
            r#"<x:workbook xmlns:x="x"><x:sheets/><x:definedNames/><x:calcPr fullCalcOnLoad="1"/><x:extLst><x:ext/></x:extLst></x:workbook>"#
        );

        let out = force_full_calc_on_load(r#"<workbook><sheets/></workbook>"#).unwrap();
        assert_eq!(out, r#"<workbook><sheets/><calcPr fullCalcOnLoad="1"/></workbook>"#);
    }

    #[test]
    fn test_remove_calc_chain_relationship() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/></Relationships>"#;
        let out = remove_relationships_to(xml, "xl/calcChain.xml").unwrap();
        assert!(!out.contains("rId4"));
        assert!(out.contains(r#"Target="worksheets/sheet1.xml""#));
    }
}
