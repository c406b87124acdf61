//! Common utilities for document generation.
//!
//! Shared helpers for date formatting, XML text escaping and file naming.

use chrono::NaiveDate;
use quick_xml::escape::escape;

/// Format a date the way the Word report prints it (e.g., "15/03/24").
pub fn format_report_date(date: NaiveDate) -> String {
    date.format("%d/%m/%y").to_string()
}

/// Format a date the way the service sheet stores it (e.g., "2024-03-15").
pub fn format_sheet_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Escape a value for use as XML character data.
///
/// Characters that XML 1.0 cannot carry at all (most C0 controls) are
/// dropped rather than escaped.
pub fn escape_xml_text(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|&ch| matches!(ch, '\t' | '\n' | '\r') || ch >= '\u{20}')
        .filter(|&ch| !matches!(ch, '\u{FFFE}' | '\u{FFFF}'))
        .collect();
    escape(cleaned.as_str()).into_owned()
}

/// Sanitize a string for use in filenames: reserved characters are
/// removed, then the rest is slugged to lowercase ASCII with dashes.
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let cleaned = sanitize_filename::sanitize(name.trim());
    let mut result = String::new();
    let mut last_dash = false;

    for ch in cleaned.chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || ch == '-' || ch == '_' || ch == '.')
            && !last_dash
            && !result.is_empty()
        {
            result.push('-');
            last_dash = true;
        }
    }

    let trimmed = result.trim_matches('-');
    if trimmed.is_empty() {
        return fallback.to_string();
    }

    trimmed.to_string()
}

/// Cut a short excerpt of `text` around `start..end` for error messages.
pub fn excerpt(text: &str, start: usize, end: usize, radius: usize) -> String {
    let mut from = start.saturating_sub(radius);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + radius).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].to_string()
}
