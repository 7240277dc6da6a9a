//! Normalization of raw bank and rent-ledger tables into typed records

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::ingest::table::RawTable;
use crate::types::*;
use crate::utils::validation::{clean_cell, parse_amount, parse_date};

/// Source headers renamed to canonical bank columns (matched case-sensitively)
pub const BANK_ALIASES: &[(&str, &str)] = &[
    ("TransactionID", "txn_id"),
    ("DatePaid", "date"),
    ("AmountPaid", "amount"),
    ("Description", "description"),
    ("Reference", "reference"),
];

/// Source headers renamed to canonical invoice columns (matched case-sensitively)
pub const INVOICE_ALIASES: &[(&str, &str)] = &[
    ("InvoiceID", "invoice_id"),
    ("TenantName", "customer"),
    ("MonthlyRent", "amount"),
    ("DueDate", "due_date"),
    ("PaymentReference", "reference"),
];

pub const BANK_COLUMNS: &[&str] = &["txn_id", "date", "amount", "description", "reference"];

pub const INVOICE_COLUMNS: &[&str] = &[
    "invoice_id",
    "customer",
    "amount",
    "due_date",
    "issue_date",
    "reference",
];

// Hyphenated codes take priority over run-together ones
static REFERENCE_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"\b[A-Z]{2,}-\d+\b").expect("hyphenated reference pattern"),
        Regex::new(r"\b[A-Z]{2,}\d{2,}\b").expect("compact reference pattern"),
    ]
});

static NOISE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(payment|eft|incoming|debit order|txn|ref:|paid)\b")
        .expect("noise word pattern")
});

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9\s]").expect("non-alphanumeric pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Pull a reference code such as `ABC-123` or `INV2024` out of free text
///
/// Matching is case-insensitive and the result is upper-cased. Returns an
/// empty string when the text carries no code.
pub fn extract_reference(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let upper = text.to_uppercase();
    REFERENCE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.find(&upper))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Strip banking noise words and punctuation, lower-case, collapse spaces
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let without_noise = NOISE_WORDS.replace_all(text, " ");
    let alphanumeric = NON_ALPHANUMERIC.replace_all(&without_noise, " ");
    let lowered = alphanumeric.to_lowercase();
    WHITESPACE.replace_all(&lowered, " ").trim().to_string()
}

/// A table with canonical column names resolved to positions
///
/// Canonical columns that the source lacks resolve to `None`, which reads
/// as null for every row.
struct ColumnView<'a> {
    table: &'a RawTable,
    canonical: BTreeMap<&'static str, usize>,
    extras: Vec<(String, usize)>,
}

impl<'a> ColumnView<'a> {
    fn new(
        table: &'a RawTable,
        aliases: &[(&str, &'static str)],
        columns: &[&'static str],
    ) -> Self {
        let mut canonical = BTreeMap::new();
        let mut extras = Vec::new();

        for (idx, header) in table.headers().iter().enumerate() {
            let renamed = aliases
                .iter()
                .find(|(source, _)| source == header)
                .map(|(_, target)| target.to_string())
                .unwrap_or_else(|| header.to_lowercase());

            match columns.iter().find(|c| **c == renamed) {
                // First occurrence wins if two headers collapse to one name
                Some(column) => {
                    canonical.entry(*column).or_insert(idx);
                }
                None => extras.push((renamed, idx)),
            }
        }

        Self {
            table,
            canonical,
            extras,
        }
    }

    fn has(&self, column: &str) -> bool {
        self.canonical.contains_key(column)
    }

    fn cell(&self, row: usize, column: &str) -> Option<String> {
        let idx = *self.canonical.get(column)?;
        clean_cell(self.table.rows()[row].get(idx).map(String::as_str))
    }

    fn extra(&self, row: usize) -> BTreeMap<String, String> {
        self.extras
            .iter()
            .filter_map(|(name, idx)| {
                let value = clean_cell(self.table.rows()[row].get(*idx).map(String::as_str))?;
                Some((name.clone(), value))
            })
            .collect()
    }
}

/// Normalize a bank statement table
pub fn normalize_bank(table: &RawTable) -> Vec<BankTransaction> {
    let view = ColumnView::new(table, BANK_ALIASES, BANK_COLUMNS);

    (0..table.len())
        .map(|row| {
            let description = view.cell(row, "description");
            let reference = view.cell(row, "reference");

            let mut extracted_ref = extract_reference(description.as_deref().unwrap_or(""));
            if extracted_ref.is_empty() {
                extracted_ref = extract_reference(reference.as_deref().unwrap_or(""));
            }

            let normalized_text = normalize_text(&format!(
                "{} {}",
                description.as_deref().unwrap_or(""),
                reference.as_deref().unwrap_or("")
            ));

            BankTransaction {
                row,
                txn_id: view.cell(row, "txn_id"),
                date: view.cell(row, "date").as_deref().and_then(parse_date),
                amount: view.cell(row, "amount").as_deref().and_then(parse_amount),
                description,
                reference,
                extracted_ref,
                normalized_text,
                extra: view.extra(row),
            }
        })
        .collect()
}

/// Normalize a rent ledger table
pub fn normalize_invoices(table: &RawTable) -> Vec<Invoice> {
    let view = ColumnView::new(table, INVOICE_ALIASES, INVOICE_COLUMNS);
    let has_issue_date = view.has("issue_date");

    (0..table.len())
        .map(|row| {
            let customer = view.cell(row, "customer");
            let due_date = view.cell(row, "due_date").as_deref().and_then(parse_date);
            let issue_date = if has_issue_date {
                view.cell(row, "issue_date")
                    .as_deref()
                    .and_then(parse_date)
                    .or(due_date)
            } else {
                due_date
            };

            Invoice {
                row,
                invoice_id: view.cell(row, "invoice_id"),
                normalized_customer: normalize_text(customer.as_deref().unwrap_or("")),
                customer,
                amount: view.cell(row, "amount").as_deref().and_then(parse_amount),
                due_date,
                issue_date,
                reference: view.cell(row, "reference"),
                extra: view.extra(row),
            }
        })
        .collect()
}

/// Normalize both sides of a reconciliation
pub fn normalize(bank: &RawTable, invoices: &RawTable) -> (Vec<BankTransaction>, Vec<Invoice>) {
    let transactions = normalize_bank(bank);
    let invoices = normalize_invoices(invoices);
    tracing::debug!(
        transactions = transactions.len(),
        invoices = invoices.len(),
        "Normalized input tables"
    );
    (transactions, invoices)
}
