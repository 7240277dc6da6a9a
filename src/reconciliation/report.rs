//! Report assembly: findings merge and the statistics bundle

use crate::types::*;

/// Default number of unmatched rows sampled for prose generation
pub const DEFAULT_SAMPLE_ROWS: usize = 3;

/// Merge matcher findings with rule findings
///
/// For each rule category: the rule result is taken when the matcher has
/// no entry for it, or has an empty entry while the rule result is not
/// empty. Otherwise the matcher's entry stands, so a matcher that already
/// found something overrides the cheaper rule.
pub fn merge_findings(matcher: &Findings, rules: &Findings) -> Findings {
    let mut merged = matcher.clone();
    for (category, rule_set) in rules.iter() {
        let take_rule = match matcher.get_recorded(*category) {
            None => true,
            Some(existing) => existing.is_empty() && !rule_set.is_empty(),
        };
        if take_rule {
            merged.insert(*category, rule_set.clone());
        }
    }
    merged
}

/// Combine the matcher outcome with rule findings into the final result
pub fn assemble(outcome: MatchOutcome, rule_findings: &Findings) -> ReconciliationResult {
    let findings = merge_findings(&outcome.findings, rule_findings);
    ReconciliationResult {
        matches: outcome.matches,
        unmatched_txns: outcome.unmatched_txns,
        unmatched_invs: outcome.unmatched_invs,
        findings,
    }
}

/// Build the statistics bundle consumed by summarizers
pub fn build_stats(
    result: &ReconciliationResult,
    matcher_findings: &Findings,
    rule_findings: &Findings,
    sample_rows: usize,
) -> ReportStats {
    let findings = FindingCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), result.findings.count(*c)))
        .collect();

    ReportStats {
        counts: ReportCounts {
            matches: result.matches.len(),
            unmatched_txn: result.unmatched_txns.len(),
            unmatched_inv: result.unmatched_invs.len(),
            dup_txn: result.findings.count(FindingCategory::DuplicateTxn),
            findings,
        },
        samples: ReportSamples {
            unmatched_txns: result.unmatched_txns.iter().take(sample_rows).cloned().collect(),
            unmatched_invs: result.unmatched_invs.iter().take(sample_rows).cloned().collect(),
        },
        findings: result.findings.clone(),
        matcher_findings: matcher_findings.clone(),
        rule_findings: rule_findings.clone(),
    }
}
