//! Revision labels: `<name> R<n>` title strings

use regex::Regex;
use std::sync::OnceLock;

static REVISION: OnceLock<Regex> = OnceLock::new();

/// Compute the next revision label.
///
/// The first `R<digits>` occurrence gets its number incremented; a label
/// without one gains a trailing `" R1"`.
pub fn bump(label: &str) -> String {
    let revision = REVISION.get_or_init(|| Regex::new(r"R([0-9]+)").unwrap());
    match revision.captures(label).and_then(|caps| caps.get(1)) {
        Some(digits) => format!(
            "{}{}{}",
            &label[..digits.start()],
            increment_decimal(digits.as_str()),
            &label[digits.end()..]
        ),
        None => format!("{label} R1"),
    }
}

/// Add one to a decimal digit string of any length. Leading zeros are
/// dropped the way integer parsing would drop them.
fn increment_decimal(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    let mut bytes: Vec<u8> = trimmed.bytes().collect();

    let mut carry = true;
    for b in bytes.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            carry = false;
            break;
        }
    }
    if carry {
        bytes.insert(0, b'1');
    }

    String::from_utf8(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_existing_revision() {
        assert_eq!(bump("Oferta Cliente X R3"), "Oferta Cliente X R4");
        assert_eq!(bump("Oferta R9 final"), "Oferta R10 final");
        assert_eq!(bump("R99"), "R100");
    }

    #[test]
    fn test_bump_without_revision() {
        assert_eq!(bump("Oferta Cliente Y"), "Oferta Cliente Y R1");
        assert_eq!(bump(""), " R1");
        // lowercase r is not a revision marker
        assert_eq!(bump("Oferta r2"), "Oferta r2 R1");
    }

    #[test]
    fn test_only_first_marker_changes() {
        assert_eq!(bump("Obra R2 Oferta R5"), "Obra R3 Oferta R5");
        assert_eq!(bump("PROYECTO R12/R3"), "PROYECTO R13/R3");
    }

    #[test]
    fn test_leading_zeros_dropped() {
        assert_eq!(bump("Oferta R009"), "Oferta R10");
        assert_eq!(bump("Oferta R0"), "Oferta R1");
        assert_eq!(bump("Oferta R000"), "Oferta R1");
    }

    #[test]
    fn test_long_revision_numbers() {
        assert_eq!(
            bump("Oferta R99999999999999999999"),
            "Oferta R100000000000000000000"
        );
    }
}
