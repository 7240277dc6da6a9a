//! Amount + tenant-name matching and partial-payment detection
//!
//! Intended as the engine's secondary pass: it only ever sees what the
//! reference pass left behind.

use bigdecimal::BigDecimal;
use std::collections::HashSet;

use crate::reconciliation::matcher::{amounts_agree, MatchConfig, MatchPools};
use crate::traits::MatchPass;
use crate::types::*;

/// Share of the tenant's name tokens found in the transaction text
///
/// Both inputs are expected to be normalized already. A tenant name that
/// appears as a run of whole tokens inside the text scores 1.0.
pub fn name_similarity(customer: &str, text: &str) -> f64 {
    let name_tokens: Vec<&str> = customer
        .split_whitespace()
        .filter(|t| t.len() >= 2)
        .collect();
    if name_tokens.is_empty() || text.is_empty() {
        return 0.0;
    }

    let full_name: Vec<&str> = customer.split_whitespace().collect();
    let text_sequence: Vec<&str> = text.split_whitespace().collect();
    if text_sequence
        .windows(full_name.len())
        .any(|window| window == full_name.as_slice())
    {
        return 1.0;
    }

    let text_tokens: HashSet<&str> = text_sequence.iter().copied().collect();
    let shared = name_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    shared as f64 / name_tokens.len() as f64
}

/// Pairs leftover records on amount agreement plus tenant-name similarity,
/// then reports invoices that were paid short
#[derive(Debug, Clone)]
pub struct AmountNamePass {
    tolerance: BigDecimal,
    min_similarity: f64,
}

impl AmountNamePass {
    pub fn new(tolerance: BigDecimal, min_similarity: f64) -> Self {
        Self {
            tolerance,
            min_similarity,
        }
    }

    pub fn from_config(config: &MatchConfig) -> Self {
        Self::new(config.tolerance.clone(), config.min_name_similarity)
    }

    fn names_payer(&self, invoice: &Invoice, txn: &BankTransaction) -> bool {
        let by_name = !invoice.normalized_customer.is_empty()
            && name_similarity(&invoice.normalized_customer, &txn.normalized_text)
                >= self.min_similarity;
        let by_reference = !txn.extracted_ref.is_empty()
            && invoice
                .reference
                .as_deref()
                .is_some_and(|r| r.trim().to_uppercase() == txn.extracted_ref);
        by_name || by_reference
    }

    fn pair_by_amount_and_name(&self, pools: &mut MatchPools<'_>) -> usize {
        let transactions = pools.transactions();
        let invoices = pools.invoices();
        let mut claimed = 0;

        for txn_idx in pools.unmatched_txn_indices() {
            let txn = &transactions[txn_idx];
            if txn.amount.is_none() || txn.normalized_text.is_empty() {
                continue;
            }

            // Highest similarity wins; ties go to the earlier invoice
            let mut best: Option<(usize, f64)> = None;
            for inv_idx in pools.unmatched_inv_indices() {
                let invoice = &invoices[inv_idx];
                if !amounts_agree(txn.amount.as_ref(), invoice.amount.as_ref(), &self.tolerance) {
                    continue;
                }
                let score = name_similarity(&invoice.normalized_customer, &txn.normalized_text);
                if score < self.min_similarity {
                    continue;
                }
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((inv_idx, score));
                }
            }

            if let Some((inv_idx, _)) = best {
                if pools.claim(txn_idx, inv_idx, MatchType::FuzzyName) {
                    claimed += 1;
                }
            }
        }
        claimed
    }

    fn detect_partials(&self, pools: &MatchPools<'_>) -> Vec<PartialPayment> {
        let transactions = pools.transactions();
        let invoices = pools.invoices();
        let open_txns = pools.unmatched_txn_indices();
        let mut counted: HashSet<usize> = HashSet::new();
        let mut partials = Vec::new();

        for inv_idx in pools.unmatched_inv_indices() {
            let invoice = &invoices[inv_idx];
            let Some(expected) = invoice.amount.as_ref() else {
                continue;
            };

            let payers: Vec<usize> = open_txns
                .iter()
                .copied()
                .filter(|idx| !counted.contains(idx))
                .filter(|&idx| {
                    let txn = &transactions[idx];
                    txn.amount.is_some() && self.names_payer(invoice, txn)
                })
                .collect();
            if payers.is_empty() {
                continue;
            }

            let received_total: BigDecimal = payers
                .iter()
                .filter_map(|&idx| transactions[idx].amount.as_ref())
                .sum();
            if received_total > BigDecimal::from(0) && received_total < *expected {
                counted.extend(payers);
                partials.push(PartialPayment {
                    customer: invoice.customer.clone(),
                    invoice_id: invoice.invoice_id.clone(),
                    received_total,
                });
            }
        }
        partials
    }
}

impl MatchPass for AmountNamePass {
    fn name(&self) -> &str {
        "fuzzy_name"
    }

    fn apply(&self, pools: &mut MatchPools<'_>) {
        let claimed = self.pair_by_amount_and_name(pools);
        let partials = self.detect_partials(pools);
        tracing::debug!(
            pass = self.name(),
            claimed,
            partials = partials.len(),
            "Match pass finished"
        );
        pools.record_finding(FindingCategory::Partials, FindingSet::Partials(partials));
    }
}
