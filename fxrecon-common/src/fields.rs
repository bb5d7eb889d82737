//! Canonical field normalisation
//!
//! Bank emails and client blotters disagree on casing, date formats
//! and number formatting. Every comparison in the matching engine and
//! field comparator goes through these normalisers first.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Date formats accepted from either side, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%Y.%m.%d",
];

/// Sentinel strings that mean "no value" in extracted data.
const ABSENT_MARKERS: &[&str] = &["N/A", "NA", "NULL", "NONE", "-"];

/// Trim and upper-case a string field; empty and N/A-style markers
/// collapse to `None`.
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let upper = trimmed.to_uppercase();
    if ABSENT_MARKERS.contains(&upper.as_str()) {
        return None;
    }
    Some(upper)
}

/// Parse a date in any supported format and render it as `dd-mm-yyyy`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%d-%m-%Y").to_string());
        }
    }
    None
}

/// Parse a decimal, stripping thousands separators, and round to 4 dp.
///
/// Handles both anglo ("1,000,000.50") and continental
/// ("1.000.000,50") grouping: when both separators appear, the last
/// one is the decimal point.
pub fn normalize_decimal(raw: &str) -> Option<Decimal> {
    let trimmed: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect();
    if trimmed.is_empty() {
        return None;
    }

    let has_dot = trimmed.contains('.');
    let has_comma = trimmed.contains(',');

    let cleaned = if has_dot && has_comma {
        let last_dot = trimmed.rfind('.').unwrap_or(0);
        let last_comma = trimmed.rfind(',').unwrap_or(0);
        if last_comma > last_dot {
            // continental: dots group thousands, comma is decimal
            trimmed.replace('.', "").replace(',', ".")
        } else {
            trimmed.replace(',', "")
        }
    } else if has_comma {
        // A lone comma followed by exactly three digits is a
        // thousands separator; anything else is a decimal comma.
        let tail_len = trimmed.rfind(',').map(|i| trimmed.len() - i - 1);
        if trimmed.matches(',').count() > 1 || tail_len == Some(3) {
            trimmed.replace(',', "")
        } else {
            trimmed.replace(',', ".")
        }
    } else {
        trimmed
    };

    Decimal::from_str(&cleaned).ok().map(|d| d.round_dp(4))
}
