//! Common parsing utilities for cell references and XML text nodes

use quick_xml::Reader;
use quick_xml::events::Event;
use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::error::Result;

/// Parse a cell reference like "A1" into (row, col) as 0-based indices
///
/// Absolute markers (`$B$8`) are accepted.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let mut col = 0u32;
    let mut row_str = String::new();

    for ch in cell_ref.chars() {
        if ch == '$' {
            continue;
        } else if ch.is_ascii_alphabetic() {
            if !row_str.is_empty() {
                return None;
            }
            col = col
                .checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
        } else if ch.is_ascii_digit() {
            row_str.push(ch);
        } else {
            return None;
        }
    }

    if row_str.is_empty() || col == 0 {
        return None;
    }

    let row = row_str.parse::<u32>().ok()?;
    if row == 0 {
        return None;
    }

    // Convert to 0-based
    Some((row - 1, col - 1))
}

/// Parse a cell range like "A1:B2" into (start_row, start_col, end_row, end_col)
///
/// A single reference is treated as a one-cell range. Corners are normalized
/// so that start <= end.
pub fn parse_cell_range(range: &str) -> Option<(u32, u32, u32, u32)> {
    let mut parts = range.split(':');
    let first = parts.next()?;
    let second = parts.next().unwrap_or(first);
    if parts.next().is_some() {
        return None;
    }

    let (r1, c1) = parse_cell_ref(first)?;
    let (r2, c2) = parse_cell_ref(second)?;

    Some((r1.min(r2), c1.min(c2), r1.max(r2), c1.max(c2)))
}

/// Convert a 0-based column index into its letters ("A", "Z", "AA")
pub fn column_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Format 0-based (row, col) as an A1 reference
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

/// Last column index a worksheet can address (XFD)
const MAX_COL: i64 = 16_383;
/// Last row index a worksheet can address
const MAX_ROW: i64 = 1_048_575;

static A1_REFERENCE: OnceLock<Regex> = OnceLock::new();

/// Shift the relative A1 references of `formula` by the given offsets, the
/// way copying the formula to another cell does.
///
/// `$`-anchored parts stay put and text inside string literals or quoted
/// sheet names is left alone. A reference pushed off the sheet becomes
/// `#REF!`.
pub fn translate_formula(formula: &str, row_delta: i64, col_delta: i64) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut rest = formula;
    while let Some(start) = rest.find(['"', '\'']) {
        out.push_str(&shift_references(&rest[..start], row_delta, col_delta));
        let end = start + quoted_len(&rest[start..]);
        out.push_str(&rest[start..end]);
        rest = &rest[end..];
    }
    out.push_str(&shift_references(rest, row_delta, col_delta));
    out
}

/// Length of the quoted token at the start of `text`, doubled quotes included
fn quoted_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let quote = bytes[0];
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn shift_references(text: &str, row_delta: i64, col_delta: i64) -> String {
    let re = A1_REFERENCE
        .get_or_init(|| Regex::new(r"(\$?)([A-Za-z]{1,3})(\$?)([0-9]+)").unwrap());
    let bytes = text.as_bytes();
    re.replace_all(text, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let Some(m) = caps.get(0) else {
            return String::new();
        };
        let before = m.start().checked_sub(1).map(|i| bytes[i]);
        let after = bytes.get(m.end()).copied();
        // Function names (LOG10), defined names and numbers are not references
        let joined = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'.';
        if before.is_some_and(joined) || after.is_some_and(|b| joined(b) || b == b'(') {
            return whole.to_string();
        }
        let Some((row, col)) = parse_cell_ref(&format!("{}{}", &caps[2], &caps[4])) else {
            return whole.to_string();
        };
        if i64::from(col) > MAX_COL || i64::from(row) > MAX_ROW {
            return whole.to_string();
        }

        let col_fixed = !caps[1].is_empty();
        let row_fixed = !caps[3].is_empty();
        let new_col = if col_fixed { i64::from(col) } else { i64::from(col) + col_delta };
        let new_row = if row_fixed { i64::from(row) } else { i64::from(row) + row_delta };
        if !(0..=MAX_COL).contains(&new_col) || !(0..=MAX_ROW).contains(&new_row) {
            return "#REF!".to_string();
        }
        format!(
            "{}{}{}{}",
            &caps[1],
            column_letters(new_col as u32),
            &caps[3],
            new_row + 1
        )
    })
    .into_owned()
}

/// Read text content from an XML node, up to its closing tag
pub fn read_text_node<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => {
                text.push_str(e.unescape().map_err(quick_xml::Error::from)?.as_ref())
            }
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
