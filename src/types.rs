//! Core types and data structures for the reconciliation system

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::path::PathBuf;
use uuid::Uuid;

/// A bank statement line after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    /// Zero-based row index in the source statement
    pub row: usize,
    /// Bank-assigned transaction identifier
    pub txn_id: Option<String>,
    /// Date the payment cleared
    pub date: Option<NaiveDate>,
    /// Amount received; null when the source cell was missing or unparsable
    pub amount: Option<BigDecimal>,
    /// Free-text narrative from the bank
    pub description: Option<String>,
    /// Reference field as supplied by the payer
    pub reference: Option<String>,
    /// Reference code pulled out of the description or reference (empty if none)
    pub extracted_ref: String,
    /// Noise-stripped, lower-cased description and reference
    pub normalized_text: String,
    /// Columns with no canonical meaning, keyed by lower-cased header
    pub extra: BTreeMap<String, String>,
}

/// An expected rent payment after normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Zero-based row index in the source ledger
    pub row: usize,
    pub invoice_id: Option<String>,
    /// Tenant name
    pub customer: Option<String>,
    /// Expected rent
    pub amount: Option<BigDecimal>,
    pub due_date: Option<NaiveDate>,
    /// Falls back to `due_date` when not supplied
    pub issue_date: Option<NaiveDate>,
    /// Payment reference the tenant is expected to quote
    pub reference: Option<String>,
    /// Noise-stripped, lower-cased tenant name
    pub normalized_customer: String,
    /// Columns with no canonical meaning, keyed by lower-cased header
    pub extra: BTreeMap<String, String>,
}

/// Rule under which a transaction was paired with an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Extracted reference equals the invoice reference and amounts agree
    ExactRef,
    /// Amounts agree and the tenant name resembles the transaction text
    FuzzyName,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::ExactRef => "exact_ref",
            MatchType::FuzzyName => "fuzzy_name",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transaction paired with exactly one invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub transaction: BankTransaction,
    pub invoice: Invoice,
    pub match_type: MatchType,
}

/// An invoice that received less than the expected amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialPayment {
    pub customer: Option<String>,
    pub invoice_id: Option<String>,
    pub received_total: BigDecimal,
}

/// Named category of residual discrepancy surfaced for review
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    /// Unmatched transactions sharing the same amount and date
    DuplicateTxn,
    /// Unmatched transactions at or above the high-value percentile
    HighValueUnmatched,
    /// Invoices paid short
    Partials,
}

impl FindingCategory {
    pub const ALL: [FindingCategory; 3] = [
        FindingCategory::DuplicateTxn,
        FindingCategory::HighValueUnmatched,
        FindingCategory::Partials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCategory::DuplicateTxn => "duplicate_txn",
            FindingCategory::HighValueUnmatched => "high_value_unmatched",
            FindingCategory::Partials => "partials",
        }
    }

    /// Empty result set of the kind this category holds
    pub fn empty_set(&self) -> FindingSet {
        match self {
            FindingCategory::Partials => FindingSet::Partials(Vec::new()),
            _ => FindingSet::Transactions(Vec::new()),
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows flagged under one finding category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindingSet {
    Transactions(Vec<BankTransaction>),
    Partials(Vec<PartialPayment>),
}

impl FindingSet {
    pub fn len(&self) -> usize {
        match self {
            FindingSet::Transactions(rows) => rows.len(),
            FindingSet::Partials(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn transactions(&self) -> &[BankTransaction] {
        match self {
            FindingSet::Transactions(rows) => rows,
            FindingSet::Partials(_) => &[],
        }
    }

    pub fn partials(&self) -> &[PartialPayment] {
        match self {
            FindingSet::Partials(rows) => rows,
            FindingSet::Transactions(_) => &[],
        }
    }
}

/// Findings keyed by category
///
/// Reading a category that was never inserted yields an empty set rather
/// than nothing, so consumers never have to special-case absence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Findings {
    entries: BTreeMap<FindingCategory, FindingSet>,
}

// The category key decides the set kind; an empty array alone cannot.
impl<'de> Deserialize<'de> for Findings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<FindingCategory, FindingSet>::deserialize(deserializer)?;
        let mut findings = Findings::new();
        for (category, set) in raw {
            let set = if set.is_empty() {
                category.empty_set()
            } else {
                set
            };
            if mem::discriminant(&set) != mem::discriminant(&category.empty_set()) {
                return Err(de::Error::custom(format!(
                    "{} holds the wrong kind of rows",
                    category
                )));
            }
            findings.insert(category, set);
        }
        Ok(findings)
    }
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Findings with every category present and empty
    pub fn empty_all() -> Self {
        let mut findings = Self::new();
        for category in FindingCategory::ALL {
            findings.insert(category, category.empty_set());
        }
        findings
    }

    pub fn insert(&mut self, category: FindingCategory, set: FindingSet) {
        self.entries.insert(category, set);
    }

    /// Whether the category was explicitly recorded (possibly empty)
    pub fn contains(&self, category: FindingCategory) -> bool {
        self.entries.contains_key(&category)
    }

    /// Recorded set, or an empty one of the right kind
    pub fn get(&self, category: FindingCategory) -> FindingSet {
        self.entries
            .get(&category)
            .cloned()
            .unwrap_or_else(|| category.empty_set())
    }

    /// Recorded set without the empty fallback
    pub fn get_recorded(&self, category: FindingCategory) -> Option<&FindingSet> {
        self.entries.get(&category)
    }

    pub fn count(&self, category: FindingCategory) -> usize {
        self.entries.get(&category).map_or(0, FindingSet::len)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FindingCategory, &FindingSet)> {
        self.entries.iter()
    }

    pub fn transactions(&self, category: FindingCategory) -> &[BankTransaction] {
        self.entries
            .get(&category)
            .map_or(&[], FindingSet::transactions)
    }

    pub fn partials(&self) -> &[PartialPayment] {
        self.entries
            .get(&FindingCategory::Partials)
            .map_or(&[], FindingSet::partials)
    }
}

/// Output of the matcher before findings are merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matches: Vec<Match>,
    /// Sorted by source row
    pub unmatched_txns: Vec<BankTransaction>,
    /// Sorted by source row
    pub unmatched_invs: Vec<Invoice>,
    /// Findings produced while matching
    pub findings: Findings,
}

/// Final, immutable result of a reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub matches: Vec<Match>,
    pub unmatched_txns: Vec<BankTransaction>,
    pub unmatched_invs: Vec<Invoice>,
    /// Matcher and rule findings merged
    pub findings: Findings,
}

/// Headline counts for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub matches: usize,
    pub unmatched_txn: usize,
    pub unmatched_inv: usize,
    pub dup_txn: usize,
    /// Row count per finding category, keyed by category name
    pub findings: BTreeMap<String, usize>,
}

/// First rows of each unmatched set, for prose generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSamples {
    pub unmatched_txns: Vec<BankTransaction>,
    pub unmatched_invs: Vec<Invoice>,
}

/// Statistics bundle handed to the summarizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub counts: ReportCounts,
    pub samples: ReportSamples,
    /// Merged findings
    pub findings: Findings,
    /// Findings as the matcher produced them
    pub matcher_findings: Findings,
    /// Findings as the rule engine produced them
    pub rule_findings: Findings,
}

/// Everything a reconciliation run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconReport {
    /// Correlates log lines and published artifacts for one run
    pub run_id: Uuid,
    pub result: ReconciliationResult,
    pub stats: ReportStats,
    /// Prose action plan; never empty
    pub summary: String,
}

/// Errors that can abort a reconciliation run
///
/// Only input loading is fatal: malformed cells degrade to nulls and
/// collaborator failures are absorbed at their own boundary.
#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    #[error("Failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;
