//! Cell-level validation and coercion
//!
//! Every function here is total: a value that cannot be interpreted becomes
//! `None` instead of an error, so one bad cell never aborts a run.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::str::FromStr;

/// Date-only layouts, tried in order. Numeric forms are month-first before
/// day-first, so `03/04/2024` reads as 4 March.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%A, %d %B %Y",
    "%a, %d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Trim a raw cell, treating blank and well-known null markers as absent
pub fn clean_cell(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }
    match value.to_ascii_lowercase().as_str() {
        "nan" | "null" | "none" | "n/a" | "na" => None,
        _ => Some(value.to_string()),
    }
}

/// Largest number of digits allowed before the decimal point
const MAX_AMOUNT_INTEGER_DIGITS: i64 = 18;

/// Largest number of digits allowed after the decimal point
const MAX_AMOUNT_SCALE: i64 = 38;

/// Parse a monetary amount; non-numeric input yields `None`
///
/// Exponent notation is accepted only while the value stays within currency
/// range, so a cell like `1e4000000000` reads as null instead of expanding
/// into billions of digits during later arithmetic.
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    let amount = BigDecimal::from_str(value).ok()?;
    let (_, scale) = amount.as_bigint_and_exponent();
    let integer_digits = (amount.digits() as i64).saturating_sub(scale);
    if scale > MAX_AMOUNT_SCALE || integer_digits > MAX_AMOUNT_INTEGER_DIGITS {
        return None;
    }
    Some(amount)
}

/// Best-effort calendar date parsing over common bank and ledger layouts
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }

    // Ordinal suffixes ("5th March 2024") trip up every layout above
    let value = strip_ordinal_suffixes(value);
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&value, fmt) {
            return Some(date);
        }
    }

    None
}

fn strip_ordinal_suffixes(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let trimmed = word.trim_end_matches(',');
            let lower = trimmed.to_ascii_lowercase();
            let digits = lower.trim_end_matches(|c: char| c.is_ascii_alphabetic());
            let suffix = &lower[digits.len()..];
            if !digits.is_empty()
                && digits.chars().all(|c| c.is_ascii_digit())
                && matches!(suffix, "st" | "nd" | "rd" | "th")
            {
                let rest = &word[trimmed.len()..];
                format!("{}{}", digits, rest)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
