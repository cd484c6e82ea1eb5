//! Stylesheet handling: number formats, fills and cell formats (`cellXfs`)

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use super::workbook::RawElement;
use crate::error::{OfferError, Result};

/// First id available for custom number formats
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

/// Built-in number formats (simplified subset)
fn builtin_num_fmt(id: u32) -> Option<&'static str> {
    Some(match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => return None,
    })
}

/// Colour reference of a pattern fill foreground
#[derive(Debug, Clone, PartialEq)]
pub enum FillColor {
    Rgb(String),
    Theme(u32),
    Indexed(u32),
    Auto,
}

impl FillColor {
    /// Anything but transparent black, white or the system foreground
    fn is_highlight(&self) -> bool {
        match self {
            FillColor::Rgb(rgb) => {
                !rgb.eq_ignore_ascii_case("00000000") && !rgb.eq_ignore_ascii_case("FFFFFFFF")
            }
            FillColor::Theme(_) => true,
            FillColor::Indexed(idx) => *idx != 64,
            FillColor::Auto => false,
        }
    }
}

/// A `<fill>` entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fill {
    pub pattern_type: Option<String>,
    pub fg_color: Option<FillColor>,
    pub gradient: bool,
}

impl Fill {
    /// Whether the fill marks a manually highlighted cell
    pub fn is_highlight(&self) -> bool {
        if self.gradient {
            return true;
        }
        match self.pattern_type.as_deref() {
            None | Some("none") => false,
            Some(_) => self.fg_color.as_ref().is_some_and(FillColor::is_highlight),
        }
    }
}

/// Parsed `xl/styles.xml` plus the edits made to it
#[derive(Debug, Clone)]
pub struct Stylesheet {
    xml: String,
    ns: String,
    /// Position right after the `<styleSheet ...>` start tag
    body_start: usize,
    /// Outer span of `<numFmts>`, if present
    num_fmts_span: Option<Range<usize>>,
    /// Outer span of `<cellXfs>`
    cell_xfs_span: Range<usize>,
    num_fmts: BTreeMap<u32, String>,
    fills: Vec<Fill>,
    cell_xfs: Vec<RawElement>,
    derived: HashMap<(u32, u32), u32>,
    dirty: bool,
}

impl Stylesheet {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut ns = String::new();
        let mut body_start = None;
        let mut num_fmts_span = None;
        let mut cell_xfs_span = None;
        let mut num_fmts = BTreeMap::new();
        let mut fills = Vec::new();
        let mut cell_xfs = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"styleSheet" => {
                        let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
                        if let Some(idx) = qname.rfind(':') {
                            ns = qname[..=idx].to_string();
                        }
                        body_start = Some(reader.buffer_position() as usize);
                    }
                    b"numFmts" => {
                        let span = reader.read_to_end(e.name())?;
                        let inner = span.start as usize..span.end as usize;
                        num_fmts = parse_num_fmts(&xml[inner.clone()])?;
                        num_fmts_span = Some(outer_span(xml, inner)?);
                    }
                    b"fills" => {
                        let span = reader.read_to_end(e.name())?;
                        fills = parse_fills(&xml[span.start as usize..span.end as usize])?;
                    }
                    b"cellXfs" => {
                        let span = reader.read_to_end(e.name())?;
                        let inner = span.start as usize..span.end as usize;
                        cell_xfs = parse_xfs(&xml[inner.clone()])?;
                        cell_xfs_span = Some(outer_span(xml, inner)?);
                    }
                    b"cellStyleXfs" | b"dxfs" | b"extLst" => {
                        // Nested fills/xfs in here must not be mistaken for cell formats
                        reader.read_to_end(e.name())?;
                    }
                    _ => {}
                },
                Event::Empty(e) => {
                    let after = reader.buffer_position() as usize;
                    let start = xml[..after].rfind('<').unwrap_or(after);
                    match e.local_name().as_ref() {
                        b"numFmts" => num_fmts_span = Some(start..after),
                        b"cellXfs" => cell_xfs_span = Some(start..after),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let body_start = body_start.ok_or_else(|| {
            OfferError::InvalidFormat("xl/styles.xml has no <styleSheet>".to_string())
        })?;
        let cell_xfs_span = cell_xfs_span
            .ok_or_else(|| OfferError::MissingPart("<cellXfs> in xl/styles.xml".to_string()))?;

        Ok(Self {
            xml: xml.to_string(),
            ns,
            body_start,
            num_fmts_span,
            cell_xfs_span,
            num_fmts,
            fills,
            cell_xfs,
            derived: HashMap::new(),
            dirty: false,
        })
    }

    fn xf(&self, xf_index: u32) -> Option<&RawElement> {
        self.cell_xfs.get(xf_index as usize)
    }

    fn xf_attr_u32(&self, xf_index: u32, key: &str) -> u32 {
        self.xf(xf_index)
            .and_then(|xf| xf.attr(key))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Number format code applied by the cell format `xf_index`
    pub fn format_code(&self, xf_index: u32) -> Option<String> {
        let id = self.xf_attr_u32(xf_index, "numFmtId");
        self.num_fmts
            .get(&id)
            .cloned()
            .or_else(|| builtin_num_fmt(id).map(str::to_string))
    }

    pub fn fill(&self, xf_index: u32) -> Option<&Fill> {
        let fill_id = self.xf_attr_u32(xf_index, "fillId");
        self.fills.get(fill_id as usize)
    }

    /// Whether cells using `xf_index` carry a manual highlight fill
    pub fn is_highlighted(&self, xf_index: u32) -> bool {
        self.fill(xf_index).is_some_and(Fill::is_highlight)
    }

    /// Id for a number format code, registering a custom format when needed
    pub fn ensure_num_fmt(&mut self, code: &str) -> u32 {
        if let Some(id) = (0..FIRST_CUSTOM_NUM_FMT).find(|id| builtin_num_fmt(*id) == Some(code))
        {
            return id;
        }
        if let Some((id, _)) = self.num_fmts.iter().find(|(_, c)| c.as_str() == code) {
            return *id;
        }
        let id = self
            .num_fmts
            .keys()
            .next_back()
            .map(|max| (max + 1).max(FIRST_CUSTOM_NUM_FMT))
            .unwrap_or(FIRST_CUSTOM_NUM_FMT);
        self.num_fmts.insert(id, code.to_string());
        self.dirty = true;
        id
    }

    /// Cell format equal to `xf_index` except for its number format
    pub fn with_number_format(&mut self, xf_index: u32, code: &str) -> u32 {
        let fmt_id = self.ensure_num_fmt(code);
        if self.xf(xf_index).is_some() && self.xf_attr_u32(xf_index, "numFmtId") == fmt_id {
            return xf_index;
        }
        if let Some(&derived) = self.derived.get(&(xf_index, fmt_id)) {
            return derived;
        }

        let mut xf = self.xf(xf_index).cloned().unwrap_or_else(default_xf);
        xf.set_attr("numFmtId", fmt_id.to_string());
        xf.set_attr("applyNumberFormat", "1");

        let new_index = match self.cell_xfs.iter().position(|existing| *existing == xf) {
            Some(pos) => pos as u32,
            None => {
                self.cell_xfs.push(xf);
                self.dirty = true;
                (self.cell_xfs.len() - 1) as u32
            }
        };
        self.derived.insert((xf_index, fmt_id), new_index);
        new_index
    }

    pub fn is_modified(&self) -> bool {
        self.dirty
    }

    /// Serialize back to `styles.xml`, rewriting only `<numFmts>` and `<cellXfs>`
    pub fn to_xml(&self) -> String {
        if !self.dirty {
            return self.xml.clone();
        }

        let ns = &self.ns;
        let mut num_fmts = String::new();
        if !self.num_fmts.is_empty() {
            num_fmts.push_str(&format!("<{ns}numFmts count=\"{}\">", self.num_fmts.len()));
            for (id, code) in &self.num_fmts {
                num_fmts.push_str(&format!(
                    "<{ns}numFmt numFmtId=\"{id}\" formatCode=\"{}\"/>",
                    escape(code.as_str())
                ));
            }
            num_fmts.push_str(&format!("</{ns}numFmts>"));
        }

        let mut cell_xfs = format!("<{ns}cellXfs count=\"{}\">", self.cell_xfs.len());
        let xf_tag = format!("{ns}xf");
        for xf in &self.cell_xfs {
            xf.write(&mut cell_xfs, &xf_tag);
        }
        cell_xfs.push_str(&format!("</{ns}cellXfs>"));

        // numFmts always precedes cellXfs
        let num_fmts_span = self
            .num_fmts_span
            .clone()
            .unwrap_or(self.body_start..self.body_start);
        let xfs = self.cell_xfs_span.clone();

        let mut out = String::with_capacity(self.xml.len() + num_fmts.len());
        out.push_str(&self.xml[..num_fmts_span.start]);
        out.push_str(&num_fmts);
        out.push_str(&self.xml[num_fmts_span.end..xfs.start]);
        out.push_str(&cell_xfs);
        out.push_str(&self.xml[xfs.end..]);
        out
    }
}

fn default_xf() -> RawElement {
    RawElement {
        attrs: ["numFmtId", "fontId", "fillId", "borderId", "xfId"]
            .iter()
            .map(|k| (k.to_string(), "0".to_string()))
            .collect(),
        inner: None,
    }
}

/// Expand the inner span of an element to cover its start and end tags
fn outer_span(xml: &str, inner: Range<usize>) -> Result<Range<usize>> {
    let start = xml[..inner.start].rfind('<');
    let end = xml[inner.end..].find('>').map(|pos| inner.end + pos + 1);
    match (start, end) {
        (Some(start), Some(end)) => Ok(start..end),
        _ => Err(OfferError::InvalidFormat(
            "xl/styles.xml: unterminated element".to_string(),
        )),
    }
}

fn attr_string(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

fn parse_num_fmts(inner: &str) -> Result<BTreeMap<u32, String>> {
    let mut num_fmts = BTreeMap::new();
    let mut reader = Reader::from_str(inner);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"numFmt" => {
                let id = attr_string(&e, b"numFmtId")?.and_then(|v| v.parse::<u32>().ok());
                let code = attr_string(&e, b"formatCode")?;
                if let (Some(id), Some(code)) = (id, code) {
                    num_fmts.insert(id, code);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(num_fmts)
}

fn parse_fills(inner: &str) -> Result<Vec<Fill>> {
    let mut fills = Vec::new();
    let mut current: Option<Fill> = None;
    let mut reader = Reader::from_str(inner);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"fill" => {
                    if let Some(done) = current.take() {
                        // `<fill/>` never gets an End event
                        fills.push(done);
                    }
                    current = Some(Fill::default());
                }
                b"patternFill" => {
                    if let Some(fill) = current.as_mut() {
                        fill.pattern_type = attr_string(&e, b"patternType")?;
                    }
                }
                b"gradientFill" => {
                    if let Some(fill) = current.as_mut() {
                        fill.gradient = true;
                    }
                }
                b"fgColor" => {
                    if let Some(fill) = current.as_mut() {
                        fill.fg_color = parse_color(&e)?;
                    }
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"fill" => {
                if let Some(done) = current.take() {
                    fills.push(done);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if let Some(done) = current.take() {
        fills.push(done);
    }
    Ok(fills)
}

fn parse_color(e: &BytesStart<'_>) -> Result<Option<FillColor>> {
    if let Some(rgb) = attr_string(e, b"rgb")? {
        return Ok(Some(FillColor::Rgb(rgb)));
    }
    if let Some(theme) = attr_string(e, b"theme")?.and_then(|v| v.parse().ok()) {
        return Ok(Some(FillColor::Theme(theme)));
    }
    if let Some(indexed) = attr_string(e, b"indexed")?.and_then(|v| v.parse().ok()) {
        return Ok(Some(FillColor::Indexed(indexed)));
    }
    if attr_string(e, b"auto")?.is_some() {
        return Ok(Some(FillColor::Auto));
    }
    Ok(None)
}

fn parse_xfs(inner: &str) -> Result<Vec<RawElement>> {
    let mut xfs = Vec::new();
    let mut reader = Reader::from_str(inner);
    loop {
        match reader.read_event()? {
            Event::Empty(e) if e.local_name().as_ref() == b"xf" => {
                xfs.push(RawElement::from_start(&e)?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"xf" => {
                let mut xf = RawElement::from_start(&e)?;
                let span = reader.read_to_end(e.name())?;
                xf.inner = Some(inner[span.start as usize..span.end as usize].to_string());
                xfs.push(xf);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(xfs)
}
