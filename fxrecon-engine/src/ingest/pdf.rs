//! PDF text extraction and header synthesis
//!
//! Standalone PDF confirmations carry no transport metadata, so the
//! sender and subject are synthesised by scanning the leading lines
//! of the extracted text.

use anyhow::Context;
use regex::Regex;
use std::sync::OnceLock;

/// Lines scanned for From:/Subject:/address patterns
const HEADER_SCAN_LINES: usize = 20;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
    })
}

/// Extract page text from a PDF document.
pub fn extract_text(bytes: &[u8]) -> anyhow::Result<String> {
    pdf_extract::extract_text_from_mem(bytes).context("failed to extract PDF text")
}

/// Scan the first lines of extracted text for a sender address and a
/// subject line.
pub fn scan_headers(text: &str) -> (Option<String>, Option<String>) {
    let mut sender = None;
    let mut subject = None;

    for line in text.lines().take(HEADER_SCAN_LINES) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if subject.is_none() {
            if let Some(rest) = strip_prefix_ci(trimmed, &lower, "subject:")
                .or_else(|| strip_prefix_ci(trimmed, &lower, "asunto:"))
            {
                subject = Some(rest.trim().to_string());
                continue;
            }
        }
        if sender.is_none() {
            if let Some(rest) = strip_prefix_ci(trimmed, &lower, "from:")
                .or_else(|| strip_prefix_ci(trimmed, &lower, "de:"))
            {
                if let Some(m) = email_regex().find(rest) {
                    sender = Some(m.as_str().to_string());
                } else {
                    sender = Some(rest.trim().to_string());
                }
                continue;
            }
            if let Some(m) = email_regex().find(trimmed) {
                sender = Some(m.as_str().to_string());
            }
        }
        if sender.is_some() && subject.is_some() {
            break;
        }
    }

    (sender, subject)
}

fn strip_prefix_ci<'a>(original: &'a str, lower: &str, prefix: &str) -> Option<&'a str> {
    if lower.starts_with(prefix) {
        Some(&original[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_from_and_subject_lines() {
        let text = "From: Mesa FX <fx@bancoabc.cl>\nSubject: Confirmación operación 32013\nEstimado cliente...";
        let (sender, subject) = scan_headers(text);
        assert_eq!(sender.as_deref(), Some("fx@bancoabc.cl"));
        assert_eq!(subject.as_deref(), Some("Confirmación operación 32013"));
    }

    #[test]
    fn bare_address_counts_as_sender() {
        let text = "Banco ABC\nconfirmaciones@bancoabc.cl\nOperación spot";
        let (sender, subject) = scan_headers(text);
        assert_eq!(sender.as_deref(), Some("confirmaciones@bancoabc.cl"));
        assert_eq!(subject, None);
    }

    #[test]
    fn scan_is_bounded_to_leading_lines() {
        let mut text = String::new();
        for _ in 0..30 {
            text.push_str("filler line\n");
        }
        text.push_str("From: fx@bancoabc.cl\n");
        let (sender, _) = scan_headers(&text);
        assert_eq!(sender, None);
    }

    #[test]
    fn spanish_headers_are_recognised() {
        let text = "De: tesoreria@santander.cl\nAsunto: Cierre de operación";
        let (sender, subject) = scan_headers(text);
        assert_eq!(sender.as_deref(), Some("tesoreria@santander.cl"));
        assert_eq!(subject.as_deref(), Some("Cierre de operación"));
    }
}
