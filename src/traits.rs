//! Traits for matching strategies and external collaborators

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::reconciliation::matcher::MatchPools;
use crate::types::*;

/// One matching strategy in the reconciliation engine
///
/// A pass sees only the records still unmatched when it runs. It claims
/// pairs through [`MatchPools::claim`], which removes both sides from the
/// pools, and may record findings of its own.
pub trait MatchPass: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Pair whatever this strategy can from the remaining pools
    fn apply(&self, pools: &mut MatchPools<'_>);
}

/// Produces a prose action plan from run statistics
///
/// Implementations must not fail: when the backing service is unreachable
/// or unconfigured they return a deterministic local message instead.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, stats: &ReportStats) -> String;
}

/// Sends a finished reconciliation somewhere humans will read it
///
/// Failures are logged and reported in the outcome, never returned as errors.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: PublishRequest<'_>) -> PublishOutcome;
}

/// What a publisher receives
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub matches: &'a [Match],
    pub unmatched_txns: &'a [BankTransaction],
    pub unmatched_invs: &'a [Invoice],
    pub summary: &'a str,
}

impl<'a> PublishRequest<'a> {
    pub fn from_result(result: &'a ReconciliationResult, summary: &'a str) -> Self {
        Self {
            matches: &result.matches,
            unmatched_txns: &result.unmatched_txns,
            unmatched_invs: &result.unmatched_invs,
            summary,
        }
    }
}

/// What a publisher managed to do
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Report files written
    pub files: Vec<PathBuf>,
    /// Whether the chat webhook accepted the summary
    pub notified: bool,
    /// Human-readable description of each failure that was swallowed
    pub errors: Vec<String>,
}

impl PublishOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
