//! Transaction-to-invoice matching
//!
//! The [`ReconciliationEngine`] runs a primary pass followed by a secondary
//! pass over shared [`MatchPools`]. The default primary pass pairs on
//! extracted reference plus amount; the default secondary pass does nothing
//! and exists so a smarter strategy (see [`crate::reconciliation::fuzzy`])
//! can be slotted in without touching the engine.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::ingest::{normalize, RawTable};
use crate::traits::MatchPass;
use crate::types::*;

/// Which invoice a reference resolves to when several invoices share it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateRefPolicy {
    /// The invoice appearing last in the ledger owns the reference
    #[default]
    LastWins,
    /// The invoice appearing first in the ledger owns the reference
    FirstWins,
}

/// Matching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Amounts agree when their absolute difference is strictly below this
    pub tolerance: BigDecimal,
    pub duplicate_policy: DuplicateRefPolicy,
    /// Minimum name similarity (0.0-1.0) used by the amount+name pass
    pub min_name_similarity: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance: BigDecimal::new(5.into(), 2),
            duplicate_policy: DuplicateRefPolicy::LastWins,
            min_name_similarity: 0.5,
        }
    }
}

/// Whether two optional amounts are within `tolerance` of each other
///
/// A null on either side never agrees.
pub fn amounts_agree(
    left: Option<&BigDecimal>,
    right: Option<&BigDecimal>,
    tolerance: &BigDecimal,
) -> bool {
    match (left, right) {
        (Some(l), Some(r)) => (l - r).abs() < *tolerance,
        _ => false,
    }
}

/// Records under consideration plus everything matched so far
#[derive(Debug)]
pub struct MatchPools<'a> {
    transactions: &'a [BankTransaction],
    invoices: &'a [Invoice],
    unmatched_txns: BTreeSet<usize>,
    unmatched_invs: BTreeSet<usize>,
    matches: Vec<Match>,
    findings: Findings,
}

impl<'a> MatchPools<'a> {
    /// Every record starts unmatched; the matcher findings placeholder is
    /// seeded with empty `duplicate_txn` and `partials` sets
    pub fn new(transactions: &'a [BankTransaction], invoices: &'a [Invoice]) -> Self {
        let mut findings = Findings::new();
        findings.insert(
            FindingCategory::DuplicateTxn,
            FindingCategory::DuplicateTxn.empty_set(),
        );
        findings.insert(
            FindingCategory::Partials,
            FindingCategory::Partials.empty_set(),
        );

        Self {
            transactions,
            invoices,
            unmatched_txns: (0..transactions.len()).collect(),
            unmatched_invs: (0..invoices.len()).collect(),
            matches: Vec::new(),
            findings,
        }
    }

    pub fn transactions(&self) -> &'a [BankTransaction] {
        self.transactions
    }

    pub fn invoices(&self) -> &'a [Invoice] {
        self.invoices
    }

    /// Snapshot of unmatched transaction positions, ascending
    pub fn unmatched_txn_indices(&self) -> Vec<usize> {
        self.unmatched_txns.iter().copied().collect()
    }

    /// Snapshot of unmatched invoice positions, ascending
    pub fn unmatched_inv_indices(&self) -> Vec<usize> {
        self.unmatched_invs.iter().copied().collect()
    }

    pub fn is_txn_unmatched(&self, idx: usize) -> bool {
        self.unmatched_txns.contains(&idx)
    }

    pub fn is_inv_unmatched(&self, idx: usize) -> bool {
        self.unmatched_invs.contains(&idx)
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// Pair a transaction with an invoice and drop both from the pools
    ///
    /// Returns `false` (and records nothing) if either side was already taken.
    pub fn claim(&mut self, txn_idx: usize, inv_idx: usize, match_type: MatchType) -> bool {
        if !self.is_txn_unmatched(txn_idx) || !self.is_inv_unmatched(inv_idx) {
            return false;
        }
        self.unmatched_txns.remove(&txn_idx);
        self.unmatched_invs.remove(&inv_idx);
        self.matches.push(Match {
            transaction: self.transactions[txn_idx].clone(),
            invoice: self.invoices[inv_idx].clone(),
            match_type,
        });
        true
    }

    /// Record (or replace) a matcher finding
    pub fn record_finding(&mut self, category: FindingCategory, set: FindingSet) {
        self.findings.insert(category, set);
    }

    /// Freeze into an outcome with unmatched sets sorted by source row
    pub fn into_outcome(self) -> MatchOutcome {
        let mut unmatched_txns: Vec<BankTransaction> = self
            .unmatched_txns
            .iter()
            .map(|&idx| self.transactions[idx].clone())
            .collect();
        unmatched_txns.sort_by_key(|t| t.row);

        let mut unmatched_invs: Vec<Invoice> = self
            .unmatched_invs
            .iter()
            .map(|&idx| self.invoices[idx].clone())
            .collect();
        unmatched_invs.sort_by_key(|i| i.row);

        MatchOutcome {
            matches: self.matches,
            unmatched_txns,
            unmatched_invs,
            findings: self.findings,
        }
    }
}

/// Index unmatched invoices by upper-cased, trimmed reference
///
/// Invoices without a reference are skipped. When several invoices carry
/// the same reference, `policy` decides which one the key points at.
pub fn build_reference_index<'a>(
    invoices: &[Invoice],
    candidates: impl IntoIterator<Item = &'a usize>,
    policy: DuplicateRefPolicy,
) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for &idx in candidates {
        let Some(reference) = invoices[idx].reference.as_deref() else {
            continue;
        };
        let key = reference.trim().to_uppercase();
        if key.is_empty() {
            continue;
        }
        match policy {
            DuplicateRefPolicy::LastWins => {
                index.insert(key, idx);
            }
            DuplicateRefPolicy::FirstWins => {
                index.entry(key).or_insert(idx);
            }
        }
    }
    index
}

/// Pairs on extracted reference plus amount agreement
///
/// Greedy and single-pass: transactions are visited in row order and the
/// first acceptable pairing is taken.
#[derive(Debug, Clone)]
pub struct ExactReferencePass {
    tolerance: BigDecimal,
    policy: DuplicateRefPolicy,
}

impl ExactReferencePass {
    pub fn new(tolerance: BigDecimal, policy: DuplicateRefPolicy) -> Self {
        Self { tolerance, policy }
    }

    pub fn from_config(config: &MatchConfig) -> Self {
        Self::new(config.tolerance.clone(), config.duplicate_policy)
    }
}

impl MatchPass for ExactReferencePass {
    fn name(&self) -> &str {
        "exact_ref"
    }

    fn apply(&self, pools: &mut MatchPools<'_>) {
        let transactions = pools.transactions();
        let invoices = pools.invoices();
        let index = build_reference_index(invoices, &pools.unmatched_invs, self.policy);

        let mut claimed = 0usize;
        for txn_idx in pools.unmatched_txn_indices() {
            let txn = &transactions[txn_idx];
            if txn.extracted_ref.is_empty() {
                continue;
            }
            let Some(&inv_idx) = index.get(&txn.extracted_ref) else {
                continue;
            };
            if !pools.is_inv_unmatched(inv_idx) {
                continue;
            }
            if amounts_agree(
                txn.amount.as_ref(),
                invoices[inv_idx].amount.as_ref(),
                &self.tolerance,
            ) && pools.claim(txn_idx, inv_idx, MatchType::ExactRef)
            {
                claimed += 1;
            }
        }

        tracing::debug!(pass = self.name(), claimed, "Match pass finished");
    }
}

/// Placeholder secondary pass that leaves the pools untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipPass;

impl MatchPass for SkipPass {
    fn name(&self) -> &str {
        "skip"
    }

    fn apply(&self, _pools: &mut MatchPools<'_>) {}
}

/// Composes the primary and secondary matching passes
pub struct ReconciliationEngine {
    config: MatchConfig,
    primary: Box<dyn MatchPass>,
    secondary: Box<dyn MatchPass>,
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine {
    /// Exact reference pass followed by a no-op
    pub fn new() -> Self {
        Self::with_config(MatchConfig::default())
    }

    pub fn with_config(config: MatchConfig) -> Self {
        Self {
            primary: Box::new(ExactReferencePass::from_config(&config)),
            secondary: Box::new(SkipPass),
            config,
        }
    }

    /// Replace the primary pass
    pub fn with_primary(mut self, pass: Box<dyn MatchPass>) -> Self {
        self.primary = pass;
        self
    }

    /// Replace the secondary pass, which only sees the primary's leftovers
    pub fn with_secondary(mut self, pass: Box<dyn MatchPass>) -> Self {
        self.secondary = pass;
        self
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match already-normalized records
    pub fn run(&self, transactions: &[BankTransaction], invoices: &[Invoice]) -> MatchOutcome {
        let mut pools = MatchPools::new(transactions, invoices);

        for pass in [&self.primary, &self.secondary] {
            pass.apply(&mut pools);
        }

        let outcome = pools.into_outcome();
        tracing::info!(
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            matches = outcome.matches.len(),
            unmatched_txns = outcome.unmatched_txns.len(),
            unmatched_invs = outcome.unmatched_invs.len(),
            "Matching complete"
        );
        outcome
    }

    /// Normalize both tables and match them
    pub fn match_tables(&self, bank: &RawTable, invoices: &RawTable) -> MatchOutcome {
        let (transactions, invoices) = normalize(bank, invoices);
        self.run(&transactions, &invoices)
    }
}

/// Normalize and match with the default engine
pub fn match_ledgers(bank: &RawTable, invoices: &RawTable) -> MatchOutcome {
    ReconciliationEngine::new().match_tables(bank, invoices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(rows: &[&[&str]]) -> RawTable {
        RawTable::from_rows(
            &["TransactionID", "DatePaid", "AmountPaid", "Description", "Reference"],
            rows,
        )
    }

    fn ledger(rows: &[&[&str]]) -> RawTable {
        RawTable::from_rows(
            &["InvoiceID", "TenantName", "MonthlyRent", "DueDate", "PaymentReference"],
            rows,
        )
    }

    #[test]
    fn test_exact_reference_match() {
        let outcome = match_ledgers(
            &bank(&[
                &["T1", "2024-03-01", "1500.00", "EFT LEASE-101 rent", ""],
                &["T2", "2024-03-02", "800.00", "unknown deposit", ""],
            ]),
            &ledger(&[
                &["I1", "Jane Doe", "1500", "2024-03-01", "lease-101"],
                &["I2", "John Roe", "900", "2024-03-01", "LEASE-102"],
            ]),
        );

        assert_eq!(outcome.matches.len(), 1);
        let m = &outcome.matches[0];
        assert_eq!(m.match_type, MatchType::ExactRef);
        assert_eq!(m.transaction.txn_id.as_deref(), Some("T1"));
        assert_eq!(m.invoice.invoice_id.as_deref(), Some("I1"));

        assert_eq!(outcome.unmatched_txns.len(), 1);
        assert_eq!(outcome.unmatched_txns[0].txn_id.as_deref(), Some("T2"));
        assert_eq!(outcome.unmatched_invs.len(), 1);
        assert_eq!(outcome.unmatched_invs[0].invoice_id.as_deref(), Some("I2"));
    }

    #[test]
    fn test_amount_tolerance_boundary() {
        let invoices = ledger(&[&["I1", "A", "100.00", "", "REF-1"]]);

        let close = match_ledgers(&bank(&[&["T1", "", "100.049", "REF-1", ""]]), &invoices);
        assert_eq!(close.matches.len(), 1);

        let below = match_ledgers(&bank(&[&["T1", "", "99.951", "REF-1", ""]]), &invoices);
        assert_eq!(below.matches.len(), 1);

        let at = match_ledgers(&bank(&[&["T1", "", "100.05", "REF-1", ""]]), &invoices);
        assert!(at.matches.is_empty());
        assert_eq!(at.unmatched_txns.len(), 1);
        assert_eq!(at.unmatched_invs.len(), 1);
    }

    #[test]
    fn test_null_amounts_never_match() {
        let outcome = match_ledgers(
            &bank(&[&["T1", "", "", "REF-1", ""], &["T2", "", "oops", "REF-2", ""]]),
            &ledger(&[&["I1", "A", "100", "", "REF-1"], &["I2", "B", "", "", "REF-2"]]),
        );
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmatched_txns.len(), 2);
        assert_eq!(outcome.unmatched_invs.len(), 2);
    }

    #[test]
    fn test_invoice_is_not_reused() {
        let outcome = match_ledgers(
            &bank(&[
                &["T1", "", "100", "REF-1", ""],
                &["T2", "", "100", "REF-1 again", ""],
            ]),
            &ledger(&[&["I1", "A", "100", "", "REF-1"]]),
        );
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].transaction.txn_id.as_deref(), Some("T1"));
        assert_eq!(outcome.unmatched_txns[0].txn_id.as_deref(), Some("T2"));
        assert!(outcome.unmatched_invs.is_empty());
    }

    #[test]
    fn test_duplicate_reference_last_wins_by_default() {
        let invoices = ledger(&[
            &["I1", "A", "100", "", "REF-1"],
            &["I2", "B", "100", "", "REF-1"],
        ]);
        let transactions = bank(&[&["T1", "", "100", "REF-1", ""]]);

        let outcome = match_ledgers(&transactions, &invoices);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].invoice.invoice_id.as_deref(), Some("I2"));
        assert_eq!(outcome.unmatched_invs[0].invoice_id.as_deref(), Some("I1"));

        let first_wins = ReconciliationEngine::with_config(MatchConfig {
            duplicate_policy: DuplicateRefPolicy::FirstWins,
            ..MatchConfig::default()
        });
        let outcome = first_wins.match_tables(&transactions, &invoices);
        assert_eq!(outcome.matches[0].invoice.invoice_id.as_deref(), Some("I1"));
    }

    #[test]
    fn test_last_wins_can_shadow_an_earlier_invoice() {
        // The earlier invoice's amount fits but the reference points at the later one
        let outcome = match_ledgers(
            &bank(&[&["T1", "", "100", "REF-1", ""]]),
            &ledger(&[
                &["I1", "A", "100", "", "REF-1"],
                &["I2", "B", "250", "", "REF-1"],
            ]),
        );
        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn test_build_reference_index() {
        let invoices = crate::ingest::normalize_invoices(&ledger(&[
            &["I1", "A", "1", "", " ref-9 "],
            &["I2", "B", "1", "", ""],
            &["I3", "C", "1", "", "REF-9"],
        ]));
        let all: Vec<usize> = (0..invoices.len()).collect();

        let last = build_reference_index(&invoices, &all, DuplicateRefPolicy::LastWins);
        assert_eq!(last.len(), 1);
        assert_eq!(last["REF-9"], 2);

        let first = build_reference_index(&invoices, &all, DuplicateRefPolicy::FirstWins);
        assert_eq!(first["REF-9"], 0);
    }

    #[test]
    fn test_matching_is_idempotent() {
        let transactions = bank(&[
            &["T1", "2024-03-01", "1500", "LEASE-101", ""],
            &["T2", "2024-03-01", "500", "cash", ""],
            &["T3", "2024-03-02", "700", "", "LEASE-103"],
        ]);
        let invoices = ledger(&[
            &["I1", "A", "1500", "2024-03-01", "LEASE-101"],
            &["I2", "B", "600", "2024-03-01", "LEASE-102"],
            &["I3", "C", "700", "2024-03-01", "LEASE-103"],
        ]);
        let first = match_ledgers(&transactions, &invoices);
        let second = match_ledgers(&transactions, &invoices);
        assert_eq!(first, second);
        assert_eq!(first.matches.len(), 2);
    }

    #[test]
    fn test_partition_invariant() {
        let transactions = bank(&[
            &["T1", "", "10", "AA-1", ""],
            &["T2", "", "20", "AA-2", ""],
            &["T3", "", "30", "AA-9", ""],
            &["T4", "", "40", "", ""],
        ]);
        let invoices = ledger(&[
            &["I1", "", "10", "", "AA-1"],
            &["I2", "", "21", "", "AA-2"],
            &["I3", "", "40", "", "AA-4"],
        ]);
        let outcome = match_ledgers(&transactions, &invoices);

        let mut txn_rows: Vec<usize> = outcome
            .matches
            .iter()
            .map(|m| m.transaction.row)
            .chain(outcome.unmatched_txns.iter().map(|t| t.row))
            .collect();
        txn_rows.sort_unstable();
        assert_eq!(txn_rows, vec![0, 1, 2, 3]);

        let mut inv_rows: Vec<usize> = outcome
            .matches
            .iter()
            .map(|m| m.invoice.row)
            .chain(outcome.unmatched_invs.iter().map(|i| i.row))
            .collect();
        inv_rows.sort_unstable();
        assert_eq!(inv_rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_unmatched_sets_are_sorted_by_row() {
        let outcome = match_ledgers(
            &bank(&[
                &["T1", "", "5", "", ""],
                &["T2", "", "10", "AB-2", ""],
                &["T3", "", "15", "", ""],
            ]),
            &ledger(&[
                &["I1", "", "1", "", ""],
                &["I2", "", "10", "", "AB-2"],
                &["I3", "", "3", "", ""],
            ]),
        );
        let txn_rows: Vec<usize> = outcome.unmatched_txns.iter().map(|t| t.row).collect();
        let inv_rows: Vec<usize> = outcome.unmatched_invs.iter().map(|i| i.row).collect();
        assert_eq!(txn_rows, vec![0, 2]);
        assert_eq!(inv_rows, vec![0, 2]);
    }

    #[test]
    fn test_matcher_findings_placeholder() {
        let outcome = match_ledgers(&bank(&[]), &ledger(&[]));
        assert!(outcome.matches.is_empty());
        assert!(outcome.findings.contains(FindingCategory::DuplicateTxn));
        assert!(outcome.findings.contains(FindingCategory::Partials));
        assert!(outcome.findings.get(FindingCategory::DuplicateTxn).is_empty());
        assert!(outcome.findings.get(FindingCategory::Partials).is_empty());
        assert!(!outcome.findings.contains(FindingCategory::HighValueUnmatched));
    }

    #[test]
    fn test_claim_rejects_taken_records() {
        let transactions = crate::ingest::normalize_bank(&bank(&[&["T1", "", "1", "", ""]]));
        let invoices = crate::ingest::normalize_invoices(&ledger(&[&["I1", "", "1", "", ""]]));
        let mut pools = MatchPools::new(&transactions, &invoices);
        assert!(pools.claim(0, 0, MatchType::ExactRef));
        assert!(!pools.claim(0, 0, MatchType::ExactRef));
        assert_eq!(pools.matches().len(), 1);
    }
}
