//! Rule-based findings over the matcher's leftovers

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::*;

/// Parameters for the rule engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsConfig {
    /// Percentile (0-100) at or above which an unmatched amount is high-value
    pub high_value_percentile: u32,
}

impl Default for FindingsConfig {
    fn default() -> Self {
        Self {
            high_value_percentile: 90,
        }
    }
}

/// Run every rule with default settings
pub fn compute_findings(
    matches: &[Match],
    unmatched_txns: &[BankTransaction],
    unmatched_invs: &[Invoice],
) -> Findings {
    compute_findings_with(&FindingsConfig::default(), matches, unmatched_txns, unmatched_invs)
}

/// Run every rule
///
/// Total over any input: empty sets yield empty findings.
pub fn compute_findings_with(
    config: &FindingsConfig,
    _matches: &[Match],
    unmatched_txns: &[BankTransaction],
    _unmatched_invs: &[Invoice],
) -> Findings {
    let mut findings = Findings::new();
    findings.insert(
        FindingCategory::DuplicateTxn,
        FindingSet::Transactions(detect_duplicates(unmatched_txns)),
    );
    findings.insert(
        FindingCategory::HighValueUnmatched,
        FindingSet::Transactions(detect_high_value(
            unmatched_txns,
            config.high_value_percentile,
        )),
    );

    tracing::debug!(
        duplicates = findings.count(FindingCategory::DuplicateTxn),
        high_value = findings.count(FindingCategory::HighValueUnmatched),
        "Rule findings computed"
    );
    findings
}

/// Every transaction whose (amount, date) pair occurs more than once
///
/// All occurrences are returned, not just the extras. Missing amounts or
/// dates compare equal to each other.
pub fn detect_duplicates(transactions: &[BankTransaction]) -> Vec<BankTransaction> {
    let mut counts: BTreeMap<(Option<&BigDecimal>, Option<NaiveDate>), usize> = BTreeMap::new();
    for txn in transactions {
        *counts.entry((txn.amount.as_ref(), txn.date)).or_default() += 1;
    }

    transactions
        .iter()
        .filter(|txn| counts[&(txn.amount.as_ref(), txn.date)] > 1)
        .cloned()
        .collect()
}

/// Every transaction with amount at or above the given percentile
///
/// Null amounts are ignored; with no amounts at all nothing is flagged.
pub fn detect_high_value(transactions: &[BankTransaction], percentile: u32) -> Vec<BankTransaction> {
    let mut amounts: Vec<&BigDecimal> = transactions
        .iter()
        .filter_map(|t| t.amount.as_ref())
        .collect();
    amounts.sort();

    let Some(threshold) = percentile_of_sorted(&amounts, percentile) else {
        return Vec::new();
    };

    transactions
        .iter()
        .filter(|t| t.amount.as_ref().is_some_and(|a| *a >= threshold))
        .cloned()
        .collect()
}

/// Linear interpolation between closest ranks over ascending values
pub fn percentile_of_sorted(sorted: &[&BigDecimal], percentile: u32) -> Option<BigDecimal> {
    let last = sorted.len().checked_sub(1)?;
    let percentile = percentile.min(100) as usize;

    // Exact rank position = last * percentile / 100
    let scaled = last * percentile;
    let lower = scaled / 100;
    let remainder = scaled % 100;

    let base = sorted[lower].clone();
    if remainder == 0 || lower >= last {
        return Some(base);
    }

    let fraction = BigDecimal::new((remainder as i64).into(), 2);
    let gap = sorted[lower + 1] - sorted[lower];
    Some(base + gap * fraction)
}
