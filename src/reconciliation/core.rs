//! Main reconciliation orchestrator that coordinates matching, findings and collaborators

use std::path::Path;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::ingest::{normalize, RawTable};
use crate::integrations::{DefaultSummarizer, IntegrationConfig, ReportPublisher};
use crate::reconciliation::findings::{compute_findings_with, FindingsConfig};
use crate::reconciliation::matcher::{MatchConfig, ReconciliationEngine};
use crate::reconciliation::report::{assemble, build_stats, DEFAULT_SAMPLE_ROWS};
use crate::traits::*;
use crate::types::*;

/// Runs a full reconciliation and hands the result to its collaborators
pub struct Reconciler<S: Summarizer, P: Publisher> {
    engine: ReconciliationEngine,
    findings_config: FindingsConfig,
    sample_rows: usize,
    summarizer: S,
    publisher: P,
}

impl Reconciler<DefaultSummarizer, ReportPublisher> {
    /// Collaborators chosen from configuration: Gemini only with an API key,
    /// webhook only with a URL
    pub fn from_config(config: &IntegrationConfig) -> Self {
        Self::new(
            DefaultSummarizer::from_config(config),
            ReportPublisher::from_config(config),
        )
        .with_sample_rows(config.sample_rows)
    }
}

impl<S: Summarizer, P: Publisher> Reconciler<S, P> {
    /// Create a reconciler with the default matching engine
    pub fn new(summarizer: S, publisher: P) -> Self {
        Self {
            engine: ReconciliationEngine::new(),
            findings_config: FindingsConfig::default(),
            sample_rows: DEFAULT_SAMPLE_ROWS,
            summarizer,
            publisher,
        }
    }

    pub fn with_engine(mut self, engine: ReconciliationEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Use the default pass layout with different matching parameters
    pub fn with_match_config(self, config: MatchConfig) -> Self {
        self.with_engine(ReconciliationEngine::with_config(config))
    }

    pub fn with_findings_config(mut self, config: FindingsConfig) -> Self {
        self.findings_config = config;
        self
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn summarizer(&self) -> &S {
        &self.summarizer
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Match, compute findings and assemble the statistics bundle
    fn analyze(&self, bank: &RawTable, invoices: &RawTable) -> (ReconciliationResult, ReportStats) {
        let (transactions, invoices) = normalize(bank, invoices);
        let outcome = self.engine.run(&transactions, &invoices);
        let matcher_findings = outcome.findings.clone();
        let rule_findings = compute_findings_with(
            &self.findings_config,
            &outcome.matches,
            &outcome.unmatched_txns,
            &outcome.unmatched_invs,
        );

        let result = assemble(outcome, &rule_findings);
        let stats = build_stats(&result, &matcher_findings, &rule_findings, self.sample_rows);
        (result, stats)
    }

    /// Reconcile two loaded tables
    ///
    /// Never fails: malformed cells have already degraded to nulls and the
    /// summarizer falls back to a local message on its own.
    pub async fn reconcile(&self, bank: &RawTable, invoices: &RawTable) -> ReconReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("reconcile", %run_id);

        let (result, stats) = span.in_scope(|| self.analyze(bank, invoices));
        let summary = self
            .summarizer
            .summarize(&stats)
            .instrument(span.clone())
            .await;

        span.in_scope(|| {
            info!(
                matches = stats.counts.matches,
                unmatched_txn = stats.counts.unmatched_txn,
                unmatched_inv = stats.counts.unmatched_inv,
                dup_txn = stats.counts.dup_txn,
                "Reconciliation complete"
            )
        });

        ReconReport {
            run_id,
            result,
            stats,
            summary,
        }
    }

    /// Load both CSV files and reconcile them
    pub async fn reconcile_files(
        &self,
        bank_path: impl AsRef<Path>,
        invoices_path: impl AsRef<Path>,
    ) -> ReconResult<ReconReport> {
        let bank = RawTable::from_path(bank_path)?;
        let invoices = RawTable::from_path(invoices_path)?;
        Ok(self.reconcile(&bank, &invoices).await)
    }

    /// Publish a finished report; failures are reported in the outcome
    pub async fn publish(&self, report: &ReconReport) -> PublishOutcome {
        let span = info_span!("publish", run_id = %report.run_id);
        self.publisher
            .publish(PublishRequest::from_result(&report.result, &report.summary))
            .instrument(span)
            .await
    }
}
