//! Worksheet data structures
//!
//! The worksheet keeps the raw XML around everything it does not model: the
//! text before `<sheetData>` and after `</sheetData>` is kept verbatim, and
//! every `<c>` element keeps its original attributes and inner XML until it
//! is explicitly rewritten.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;

use super::merged::{MergeMap, MergeRange};
use super::parser_utils::{cell_ref, parse_cell_range, parse_cell_ref, translate_formula};
use crate::error::{OfferError, Result};

/// Cell value types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
    Formula {
        formula: String,
        cached: Option<String>,
    },
}

impl CellValue {
    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Empty, or text made only of whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Check if the cell contains a formula
    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text shown for the value. Formulas show their cached result.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(text) => text.clone(),
            CellValue::Boolean(true) => "TRUE".to_string(),
            CellValue::Boolean(false) => "FALSE".to_string(),
            CellValue::Error(err) => err.clone(),
            CellValue::Formula { cached, .. } => cached.clone().unwrap_or_default(),
        }
    }
}

/// Shortest representation of a number, without a trailing ".0" on integers
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// An XML element kept as raw attributes (still escaped) plus raw inner XML
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawElement {
    pub attrs: Vec<(String, String)>,
    pub inner: Option<String>,
}

impl RawElement {
    pub fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            attrs.push((
                String::from_utf8(attr.key.as_ref().to_vec())?,
                String::from_utf8(attr.value.to_vec())?,
            ));
        }
        Ok(Self { attrs, inner: None })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute. `value` must already be XML-escaped.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.retain(|(k, _)| k != key);
    }

    pub fn write(&self, out: &mut String, tag: &str) {
        out.push('<');
        out.push_str(tag);
        for (key, value) in &self.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            // Values read from single-quoted attributes may hold a raw quote
            out.push_str(&value.replace('"', "&quot;"));
            out.push('"');
        }
        match &self.inner {
            Some(inner) => {
                out.push('>');
                out.push_str(inner);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            None => out.push_str("/>"),
        }
    }
}

/// Represents a single cell
#[derive(Debug, Clone)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    raw: RawElement,
}

impl Cell {
    fn new(row: u32, col: u32) -> Self {
        Self {
            row,
            col,
            value: CellValue::Empty,
            raw: RawElement {
                attrs: vec![("r".to_string(), cell_ref(row, col))],
                inner: None,
            },
        }
    }

    /// Index into `cellXfs`
    pub fn style_index(&self) -> u32 {
        self.raw
            .attr("s")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Shared-formula group of the cell, if its `<f>` has `t="shared"`
    pub fn shared_formula(&self) -> Option<SharedFormula> {
        let inner = self.raw.inner.as_deref()?;
        let mut reader = Reader::from_str(inner);
        loop {
            match reader.read_event().ok()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f" => {
                    let f = RawElement::from_start(&e).ok()?;
                    if f.attr("t") != Some("shared") {
                        return None;
                    }
                    return Some(SharedFormula {
                        index: f.attr("si")?.to_string(),
                        range: f.attr("ref").map(str::to_string),
                    });
                }
                Event::Eof => return None,
                _ => {}
            }
        }
    }
}

/// Membership in a shared formula. Only the master cell carries the range
/// and the formula text; followers reuse the master's formula shifted to
/// their own position.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedFormula {
    pub index: String,
    pub range: Option<String>,
}

#[derive(Debug, Clone)]
struct Row {
    raw: RawElement,
    cells: BTreeMap<u32, Cell>,
}

/// The active worksheet of an offer workbook
#[derive(Debug, Clone)]
pub struct Worksheet {
    /// Part path inside the package, e.g. `xl/worksheets/sheet1.xml`
    pub path: String,
    prefix: String,
    suffix: String,
    /// Namespace prefix used by the sheet's elements, including the colon
    ns: String,
    rows: BTreeMap<u32, Row>,
    merges: MergeMap,
    formulas_replaced: bool,
    modified: bool,
}

static EMPTY: CellValue = CellValue::Empty;

impl Worksheet {
    /// Parse worksheet XML, decoding shared-string cells with `shared_strings`
    pub fn parse(path: &str, xml: &str, shared_strings: &[String]) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut merge_ranges: Vec<MergeRange> = Vec::new();
        let mut sheet_data: Option<(String, String, String, &str)> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                    let ns = namespace_prefix(e.name().as_ref());
                    let span = reader.read_to_end(e.name())?;
                    let (start, end) = (span.start as usize, span.end as usize);
                    sheet_data = Some((
                        xml[..start].to_string(),
                        xml[end..].to_string(),
                        ns,
                        &xml[start..end],
                    ));
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    let qname = String::from_utf8(e.name().as_ref().to_vec())?;
                    let after = reader.buffer_position() as usize;
                    let start = xml[..after].rfind('<').ok_or_else(|| {
                        OfferError::InvalidFormat(format!("{path}: malformed <sheetData/>"))
                    })?;
                    sheet_data = Some((
                        format!("{}<{}>", &xml[..start], qname),
                        format!("</{}>{}", qname, &xml[after..]),
                        namespace_prefix(qname.as_bytes()),
                        "",
                    ));
                }
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"mergeCell" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"ref" {
                            let ref_str = attr.unescape_value().map_err(quick_xml::Error::from)?;
                            if let Some(range) = parse_cell_range(&ref_str) {
                                merge_ranges.push(range);
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let Some((prefix, suffix, ns, body)) = sheet_data else {
            return Err(OfferError::InvalidFormat(format!(
                "{path}: worksheet has no <sheetData>"
            )));
        };
        let rows = parse_rows(body, shared_strings)?;

        Ok(Self {
            path: path.to_string(),
            prefix,
            suffix,
            ns,
            rows,
            merges: MergeMap::new(&merge_ranges),
            formulas_replaced: false,
            modified: false,
        })
    }

    /// Get a cell at the given position, without merge resolution
    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.rows.get(&row).and_then(|r| r.cells.get(&col))
    }

    /// Value at the given position, without merge resolution
    pub fn value(&self, row: u32, col: u32) -> &CellValue {
        self.get_cell(row, col).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    pub fn style_index(&self, row: u32, col: u32) -> u32 {
        self.get_cell(row, col).map(Cell::style_index).unwrap_or(0)
    }

    pub fn merges(&self) -> &MergeMap {
        &self.merges
    }

    /// Anchor cell holding the value of (row, col)
    pub fn resolve(&self, row: u32, col: u32) -> (u32, u32) {
        self.merges.resolve(row, col)
    }

    /// Value of (row, col) after merge resolution
    pub fn resolved_value(&self, row: u32, col: u32) -> &CellValue {
        let (row, col) = self.resolve(row, col);
        self.value(row, col)
    }

    /// Last 0-based row that holds a row element or belongs to a merged range
    pub fn last_row(&self) -> Option<u32> {
        let rows = self.rows.keys().next_back().copied();
        match (rows, self.merges.last_row()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Whether a rewrite replaced a formula cell
    pub fn formulas_replaced(&self) -> bool {
        self.formulas_replaced
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Write a number, optionally switching the cell to style `style`
    pub fn set_number(&mut self, row: u32, col: u32, value: f64, style: Option<u32>) {
        self.release_shared_formula(row, col);
        let inner = format!("<{ns}v>{value}</{ns}v>", ns = self.ns);
        let cell = self.cell_mut(row, col);
        let replaced = cell.value.is_formula();
        cell.raw.remove_attr("t");
        if let Some(style) = style {
            cell.raw.set_attr("s", style.to_string());
        }
        cell.raw.inner = Some(inner);
        cell.value = CellValue::Number(value);
        self.formulas_replaced |= replaced;
    }

    /// Write text as an inline string, keeping the cell's style
    pub fn set_text(&mut self, row: u32, col: u32, text: &str) {
        self.release_shared_formula(row, col);
        let inner = format!(
            "<{ns}is><{ns}t xml:space=\"preserve\">{}</{ns}t></{ns}is>",
            escape(text),
            ns = self.ns
        );
        let cell = self.cell_mut(row, col);
        let replaced = cell.value.is_formula();
        cell.raw.set_attr("t", "inlineStr");
        cell.raw.inner = Some(inner);
        cell.value = CellValue::Text(text.to_string());
        self.formulas_replaced |= replaced;
    }

    /// Before (row, col) loses its formula, hand a shared-formula master role
    /// to the first remaining follower so the group keeps its formula text.
    fn release_shared_formula(&mut self, row: u32, col: u32) {
        let Some(cell) = self.get_cell(row, col) else {
            return;
        };
        let Some(SharedFormula {
            index,
            range: Some(_),
        }) = cell.shared_formula()
        else {
            return;
        };
        let CellValue::Formula { formula, .. } = &cell.value else {
            return;
        };
        let formula = formula.clone();

        let followers: Vec<(u32, u32)> = self
            .rows
            .values()
            .flat_map(|r| r.cells.values())
            .filter(|c| (c.row, c.col) != (row, col))
            .filter(|c| c.shared_formula().is_some_and(|f| f.index == index))
            .map(|c| (c.row, c.col))
            .collect();
        let Some(&(master_row, master_col)) = followers.first() else {
            return;
        };
        let last_row = followers.iter().map(|f| f.0).max().unwrap_or(master_row);
        let first_col = followers.iter().map(|f| f.1).min().unwrap_or(master_col);
        let last_col = followers.iter().map(|f| f.1).max().unwrap_or(master_col);
        let range = format!(
            "{}:{}",
            cell_ref(master_row, first_col),
            cell_ref(last_row, last_col)
        );
        let translated = translate_formula(
            &formula,
            i64::from(master_row) - i64::from(row),
            i64::from(master_col) - i64::from(col),
        );
        log::debug!(
            "Shared formula {} moves from {} to {} as '{}'",
            index,
            cell_ref(row, col),
            cell_ref(master_row, master_col),
            translated
        );

        let ns = self.ns.clone();
        let Some(master) = self
            .rows
            .get_mut(&master_row)
            .and_then(|r| r.cells.get_mut(&master_col))
        else {
            return;
        };
        let cached = match &master.value {
            CellValue::Formula { cached, .. } => cached.clone(),
            _ => None,
        };
        let mut inner = format!(
            "<{ns}f t=\"shared\" ref=\"{range}\" si=\"{}\">{}</{ns}f>",
            escape(index.as_str()),
            escape(translated.as_str())
        );
        if let Some(cached) = &cached {
            inner.push_str(&format!("<{ns}v>{}</{ns}v>", escape(cached.as_str())));
        }
        master.raw.inner = Some(inner);
        master.value = CellValue::Formula {
            formula: translated,
            cached,
        };
        self.modified = true;
    }

    fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        self.modified = true;
        let row_entry = self.rows.entry(row).or_insert_with(|| Row {
            raw: RawElement {
                attrs: vec![("r".to_string(), (row + 1).to_string())],
                inner: None,
            },
            cells: BTreeMap::new(),
        });
        if !row_entry.cells.contains_key(&col) {
            // The spans hint no longer covers the new cell
            row_entry.raw.remove_attr("spans");
        }
        row_entry
            .cells
            .entry(col)
            .or_insert_with(|| Cell::new(row, col))
    }

    /// Serialize back to worksheet XML
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(self.prefix.len() + self.suffix.len());
        out.push_str(&self.prefix);
        let row_tag = format!("{}row", self.ns);
        let cell_tag = format!("{}c", self.ns);
        for row in self.rows.values() {
            if row.cells.is_empty() {
                row.raw.write(&mut out, &row_tag);
                continue;
            }
            let mut cells = String::new();
            for cell in row.cells.values() {
                cell.raw.write(&mut cells, &cell_tag);
            }
            let mut element = row.raw.clone();
            element.inner = Some(cells);
            element.write(&mut out, &row_tag);
        }
        out.push_str(&self.suffix);
        out
    }
}

/// Prefix of a qualified name including the colon, empty when unprefixed
pub(crate) fn namespace_prefix(qname: &[u8]) -> String {
    let qname = String::from_utf8_lossy(qname);
    match qname.rfind(':') {
        Some(idx) => qname[..=idx].to_string(),
        None => String::new(),
    }
}

fn parse_rows(body: &str, shared_strings: &[String]) -> Result<BTreeMap<u32, Row>> {
    let mut rows = BTreeMap::new();
    let mut reader = Reader::from_str(body);
    let mut current_row: Option<u32> = None;
    let mut next_row = 0u32;
    let mut next_col = 0u32;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                // `<row/>` and `<row>` both open a row; cells only follow the latter
                let mut raw = RawElement::from_start(&e)?;
                let row = match raw.attr("r").and_then(|r| r.parse::<u32>().ok()) {
                    Some(r) if r > 0 => r - 1,
                    _ => {
                        raw.set_attr("r", (next_row + 1).to_string());
                        next_row
                    }
                };
                rows.insert(
                    row,
                    Row {
                        raw,
                        cells: BTreeMap::new(),
                    },
                );
                current_row = Some(row);
                next_row = row + 1;
                next_col = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let mut raw = RawElement::from_start(&e)?;
                let span = reader.read_to_end(e.name())?;
                raw.inner = Some(body[span.start as usize..span.end as usize].to_string());
                insert_cell(&mut rows, current_row, &mut next_col, raw, shared_strings)?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let raw = RawElement::from_start(&e)?;
                insert_cell(&mut rows, current_row, &mut next_col, raw, shared_strings)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

fn insert_cell(
    rows: &mut BTreeMap<u32, Row>,
    current_row: Option<u32>,
    next_col: &mut u32,
    mut raw: RawElement,
    shared_strings: &[String],
) -> Result<()> {
    let Some(row) = current_row else {
        return Err(OfferError::InvalidFormat(
            "cell element outside of a row".to_string(),
        ));
    };
    let col = match raw.attr("r").and_then(parse_cell_ref) {
        Some((_, c)) => c,
        None => {
            let c = *next_col;
            raw.set_attr("r", cell_ref(row, c));
            c
        }
    };
    *next_col = col + 1;

    let value = decode_cell_value(raw.attr("t"), raw.inner.as_deref(), shared_strings)?;
    if let Some(entry) = rows.get_mut(&row) {
        entry.cells.insert(col, Cell {
            row,
            col,
            value,
            raw,
        });
    }
    Ok(())
}

/// Decode the value of a `<c>` element from its type attribute and inner XML
pub fn decode_cell_value(
    cell_type: Option<&str>,
    inner: Option<&str>,
    shared_strings: &[String],
) -> Result<CellValue> {
    let Some(inner) = inner else {
        return Ok(CellValue::Empty);
    };

    let mut reader = Reader::from_str(inner);
    let mut v: Option<String> = None;
    let mut formula: Option<String> = None;
    let mut inline = String::new();
    let mut has_inline = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"v" => v = Some(read_element_text(&mut reader)?),
                b"f" => formula = Some(read_element_text(&mut reader)?),
                b"is" => has_inline = true,
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => inline.push_str(&read_element_text(&mut reader)?),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                // Shared-formula followers carry an empty <f/>
                b"f" => formula = Some(String::new()),
                b"is" => has_inline = true,
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"rPh" => in_phonetic = false,
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(formula) = formula {
        return Ok(CellValue::Formula { formula, cached: v });
    }

    let value = match cell_type {
        Some("s") => v
            .and_then(|idx| idx.trim().parse::<usize>().ok())
            .and_then(|idx| shared_strings.get(idx).cloned())
            .map(CellValue::Text)
            .unwrap_or(CellValue::Empty),
        Some("inlineStr") if has_inline => CellValue::Text(inline),
        Some("inlineStr") => CellValue::Empty,
        Some("str") | Some("d") => v.map(CellValue::Text).unwrap_or(CellValue::Empty),
        Some("b") => v
            .map(|b| CellValue::Boolean(b.trim() == "1" || b.trim() == "true"))
            .unwrap_or(CellValue::Empty),
        Some("e") => v.map(CellValue::Error).unwrap_or(CellValue::Empty),
        _ => match v {
            Some(text) => match text.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(text),
            },
            None => CellValue::Empty,
        },
    };
    Ok(value)
}

/// Read the text of the element just opened, leaving the reader after its end tag
fn read_element_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                text.push_str(e.unescape().map_err(quick_xml::Error::from)?.as_ref())
            }
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}
