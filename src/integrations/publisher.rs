//! CSV report files and chat webhook notification

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::integrations::config::IntegrationConfig;
use crate::integrations::retry::{retry_with_policy, RetryPolicy};
use crate::traits::{PublishOutcome, PublishRequest, Publisher};
use crate::types::*;

pub const MATCHES_FILE: &str = "matches.csv";
pub const UNMATCHED_TXNS_FILE: &str = "unmatched_txns.csv";
pub const UNMATCHED_INVS_FILE: &str = "unmatched_invs.csv";

const TRANSACTION_COLUMNS: [&str; 7] = [
    "txn_id",
    "date",
    "amount",
    "description",
    "reference",
    "extracted_ref",
    "normalized_text",
];

const INVOICE_COLUMNS: [&str; 7] = [
    "invoice_id",
    "customer",
    "amount",
    "due_date",
    "issue_date",
    "reference",
    "normalized_customer",
];

const MATCH_INVOICE_COLUMNS: [&str; 6] = [
    "invoice_id",
    "customer",
    "invoice_amount",
    "due_date",
    "invoice_reference",
    "match_type",
];

/// Errors from a single publishing step
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Webhook request failed: {0}")]
    Http(String),
    #[error("Webhook returned status {0}")]
    Status(u16),
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn date(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn amount(value: Option<&BigDecimal>) -> String {
    value.map(BigDecimal::to_string).unwrap_or_default()
}

fn transaction_cells(txn: &BankTransaction) -> Vec<String> {
    vec![
        text(txn.txn_id.as_deref()),
        date(txn.date),
        amount(txn.amount.as_ref()),
        text(txn.description.as_deref()),
        text(txn.reference.as_deref()),
        txn.extracted_ref.clone(),
        txn.normalized_text.clone(),
    ]
}

fn invoice_cells(inv: &Invoice) -> Vec<String> {
    vec![
        text(inv.invoice_id.as_deref()),
        text(inv.customer.as_deref()),
        amount(inv.amount.as_ref()),
        date(inv.due_date),
        date(inv.issue_date),
        text(inv.reference.as_deref()),
        inv.normalized_customer.clone(),
    ]
}

/// Union of the pass-through columns across rows, sorted
fn extra_columns<'a>(extras: impl Iterator<Item = &'a BTreeMap<String, String>>) -> Vec<String> {
    extras
        .flat_map(|extra| extra.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn extra_cells(extra: &BTreeMap<String, String>, columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|c| extra.get(c).cloned().unwrap_or_default())
        .collect()
}

fn write_rows(path: &Path, header: Vec<String>, rows: Vec<Vec<String>>) -> Result<(), PublishError> {
    let csv_err = |source| PublishError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(&header).map_err(csv_err)?;
    for row in rows {
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write matched pairs: transaction columns followed by invoice columns
pub fn write_matches_csv(path: &Path, matches: &[Match]) -> Result<(), PublishError> {
    let extras = extra_columns(matches.iter().map(|m| &m.transaction.extra));
    let header = TRANSACTION_COLUMNS
        .iter()
        .chain(MATCH_INVOICE_COLUMNS.iter())
        .map(|c| c.to_string())
        .chain(extras.iter().cloned())
        .collect();
    let rows = matches
        .iter()
        .map(|m| {
            let mut row = transaction_cells(&m.transaction);
            row.extend([
                text(m.invoice.invoice_id.as_deref()),
                text(m.invoice.customer.as_deref()),
                amount(m.invoice.amount.as_ref()),
                date(m.invoice.due_date),
                text(m.invoice.reference.as_deref()),
                m.match_type.to_string(),
            ]);
            row.extend(extra_cells(&m.transaction.extra, &extras));
            row
        })
        .collect();
    write_rows(path, header, rows)
}

pub fn write_transactions_csv(path: &Path, txns: &[BankTransaction]) -> Result<(), PublishError> {
    let extras = extra_columns(txns.iter().map(|t| &t.extra));
    let header = TRANSACTION_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(extras.iter().cloned())
        .collect();
    let rows = txns
        .iter()
        .map(|t| {
            let mut row = transaction_cells(t);
            row.extend(extra_cells(&t.extra, &extras));
            row
        })
        .collect();
    write_rows(path, header, rows)
}

pub fn write_invoices_csv(path: &Path, invs: &[Invoice]) -> Result<(), PublishError> {
    let extras = extra_columns(invs.iter().map(|i| &i.extra));
    let header = INVOICE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(extras.iter().cloned())
        .collect();
    let rows = invs
        .iter()
        .map(|i| {
            let mut row = invoice_cells(i);
            row.extend(extra_cells(&i.extra, &extras));
            row
        })
        .collect();
    write_rows(path, header, rows)
}

fn record_file(outcome: &mut PublishOutcome, path: PathBuf, written: Result<(), PublishError>) {
    match written {
        Ok(()) => {
            debug!(path = %path.display(), "Report written");
            outcome.files.push(path);
        }
        Err(e) => {
            warn!(error = %e, "Could not write report");
            outcome.errors.push(e.to_string());
        }
    }
}

/// Writes the three report files and optionally posts the summary to a webhook
#[derive(Debug, Clone)]
pub struct ReportPublisher {
    reports_dir: PathBuf,
    webhook_url: Option<String>,
    retry: RetryPolicy,
    client: Option<Client>,
}

impl ReportPublisher {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            webhook_url: None,
            retry: RetryPolicy::default(),
            client: None,
        }
    }

    pub fn from_config(config: &IntegrationConfig) -> Self {
        let publisher = Self::new(config.reports_dir.clone()).with_retry(config.retry.clone());
        match &config.webhook_url {
            Some(url) => publisher.with_webhook(url.clone(), config.timeout),
            None => publisher,
        }
    }

    /// Enable chat notification; an unbuildable client leaves it disabled
    pub fn with_webhook(mut self, url: impl Into<String>, timeout: std::time::Duration) -> Self {
        match Client::builder().timeout(timeout).build() {
            Ok(client) => {
                self.webhook_url = Some(url.into());
                self.client = Some(client);
            }
            Err(e) => warn!(error = %e, "Could not build webhook client, notifications disabled"),
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    fn write_reports(&self, request: &PublishRequest<'_>, outcome: &mut PublishOutcome) {
        if let Err(source) = fs::create_dir_all(&self.reports_dir) {
            let e = PublishError::Io {
                path: self.reports_dir.clone(),
                source,
            };
            warn!(error = %e, "Could not create reports directory");
            outcome.errors.push(e.to_string());
            return;
        }

        let matches = self.reports_dir.join(MATCHES_FILE);
        let written = write_matches_csv(&matches, request.matches);
        record_file(outcome, matches, written);

        let txns = self.reports_dir.join(UNMATCHED_TXNS_FILE);
        let written = write_transactions_csv(&txns, request.unmatched_txns);
        record_file(outcome, txns, written);

        let invs = self.reports_dir.join(UNMATCHED_INVS_FILE);
        let written = write_invoices_csv(&invs, request.unmatched_invs);
        record_file(outcome, invs, written);
    }

    async fn post_summary(&self, client: &Client, url: &str, summary: &str) -> Result<(), PublishError> {
        let response = client
            .post(url)
            .json(&WebhookMessage { text: summary })
            .send()
            .await
            .map_err(|e| PublishError::Http(e.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status(status.as_u16()));
        }
        Ok(())
    }

    async fn notify(&self, summary: &str, outcome: &mut PublishOutcome) {
        let (Some(url), Some(client)) = (self.webhook_url.as_deref(), self.client.as_ref()) else {
            debug!("No webhook configured, skipping notification");
            return;
        };
        match retry_with_policy(&self.retry, "webhook.post", || {
            self.post_summary(client, url, summary)
        })
        .await
        {
            Ok(()) => outcome.notified = true,
            Err(e) => {
                warn!(error = %e, "Webhook notification failed");
                outcome.errors.push(e.to_string());
            }
        }
    }
}

#[async_trait]
impl Publisher for ReportPublisher {
    async fn publish(&self, request: PublishRequest<'_>) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        self.write_reports(&request, &mut outcome);
        self.notify(request.summary, &mut outcome).await;
        info!(
            files = outcome.files.len(),
            notified = outcome.notified,
            errors = outcome.errors.len(),
            "Publishing finished"
        );
        outcome
    }
}
