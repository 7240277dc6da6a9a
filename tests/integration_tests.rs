//! Integration tests for rent-recon-core

use bigdecimal::BigDecimal;
use rent_recon_core::{
    compute_findings, match_ledgers,
    utils::{FixedSummarizer, MemoryPublisher},
    DefaultSummarizer, FindingCategory, FindingSet, IntegrationConfig, LocalSummarizer,
    MatchPass, MatchPools, MatchType, RawTable, ReconError, ReconciliationEngine, Reconciler,
    ReportPublisher, RetryPolicy, Summarizer, MATCHES_FILE, UNMATCHED_INVS_FILE,
    UNMATCHED_TXNS_FILE,
};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const BANK_CSV: &str = "\
TransactionID,DatePaid,AmountPaid,Description,Reference,Branch
T1,2024-03-01,1500.00,EFT payment LEASE-101,,CPT
T2,2024-03-02,1200.049,Rent,INV2024,JHB
T3,2024-03-03,800,Cash deposit,,CPT
T4,2024-03-03,800,Cash deposit,,DBN
T5,2024-03-05,9000,Unknown transfer,,CPT
";

const LEDGER_CSV: &str = "\
InvoiceID,TenantName,MonthlyRent,DueDate,PaymentReference
I1,Jane Doe,1500,2024-03-01,lease-101
I2,Sipho Dlamini,1200,2024-03-01,INV2024
I3,Thandi Nkosi,950,2024-03-01,LEASE-303
";

fn write_inputs(dir: &Path, bank: &str, ledger: &str) -> (std::path::PathBuf, std::path::PathBuf) {
    let bank_path = dir.join("bank.csv");
    let ledger_path = dir.join("ledger.csv");
    fs::write(&bank_path, bank).unwrap();
    fs::write(&ledger_path, ledger).unwrap();
    (bank_path, ledger_path)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_subslice(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Answer exactly one HTTP request, returning the base URL and the raw request
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn test_complete_reconciliation_workflow() {
    let dir = TempDir::new().unwrap();
    let (bank_path, ledger_path) = write_inputs(dir.path(), BANK_CSV, LEDGER_CSV);
    let reports_dir = dir.path().join("reports");

    let reconciler = Reconciler::new(LocalSummarizer, ReportPublisher::new(&reports_dir));
    let report = reconciler
        .reconcile_files(&bank_path, &ledger_path)
        .await
        .unwrap();

    // Reference matches: LEASE-101 (case-folded) and INV2024 within tolerance
    let result = &report.result;
    assert_eq!(result.matches.len(), 2);
    assert_eq!(result.matches[0].transaction.txn_id.as_deref(), Some("T1"));
    assert_eq!(result.matches[0].invoice.invoice_id.as_deref(), Some("I1"));
    assert_eq!(result.matches[1].transaction.txn_id.as_deref(), Some("T2"));
    assert!(result.matches.iter().all(|m| m.match_type == MatchType::ExactRef));

    let unmatched: Vec<_> = result
        .unmatched_txns
        .iter()
        .filter_map(|t| t.txn_id.as_deref())
        .collect();
    assert_eq!(unmatched, vec!["T3", "T4", "T5"]);
    assert_eq!(result.unmatched_invs.len(), 1);
    assert_eq!(result.unmatched_invs[0].invoice_id.as_deref(), Some("I3"));

    // T3/T4 share amount and date; T5 sits above the 90th percentile
    assert_eq!(report.stats.counts.dup_txn, 2);
    let high_value = result.findings.transactions(FindingCategory::HighValueUnmatched);
    assert_eq!(high_value.len(), 1);
    assert_eq!(high_value[0].txn_id.as_deref(), Some("T5"));
    assert!(result.findings.partials().is_empty());

    // Pass-through columns survive normalization
    assert_eq!(result.unmatched_txns[1].extra.get("branch").map(String::as_str), Some("DBN"));

    let outcome = reconciler.publish(&report).await;
    assert!(outcome.is_clean());
    assert!(!outcome.notified);
    for file in [MATCHES_FILE, UNMATCHED_TXNS_FILE, UNMATCHED_INVS_FILE] {
        assert!(reports_dir.join(file).exists(), "missing {}", file);
    }
    let matches_csv = fs::read_to_string(reports_dir.join(MATCHES_FILE)).unwrap();
    assert_eq!(matches_csv.lines().count(), 3);
    assert!(matches_csv.lines().next().unwrap().contains("match_type"));
}

#[tokio::test]
async fn test_missing_columns_are_tolerated() {
    let dir = TempDir::new().unwrap();
    let (bank_path, ledger_path) = write_inputs(
        dir.path(),
        "TransactionID,AmountPaid\nT1,100\nT2,abc\n",
        "InvoiceID,MonthlyRent\nI1,100\n",
    );

    let reconciler = Reconciler::new(LocalSummarizer, MemoryPublisher::new());
    let report = reconciler
        .reconcile_files(&bank_path, &ledger_path)
        .await
        .unwrap();

    assert!(report.result.matches.is_empty());
    assert_eq!(report.result.unmatched_txns.len(), 2);
    assert_eq!(report.result.unmatched_txns[1].amount, None);
    assert!(report.result.unmatched_txns.iter().all(|t| t.extracted_ref.is_empty()));
    assert_eq!(report.result.unmatched_invs.len(), 1);
    assert_eq!(report.result.unmatched_invs[0].reference, None);
    for category in FindingCategory::ALL {
        assert!(report.result.findings.contains(category));
    }
}

#[tokio::test]
async fn test_load_errors_are_fatal() {
    let dir = TempDir::new().unwrap();
    let reconciler = Reconciler::new(LocalSummarizer, MemoryPublisher::new());

    let missing = reconciler
        .reconcile_files(dir.path().join("nope.csv"), dir.path().join("nope2.csv"))
        .await;
    assert!(matches!(missing, Err(ReconError::Io { .. })));

    let bad_path = dir.path().join("bad.csv");
    fs::write(&bad_path, b"TransactionID,AmountPaid\nT1,\xff\xfe\n").unwrap();
    let (_, ledger_path) = write_inputs(dir.path(), BANK_CSV, LEDGER_CSV);
    let bad = reconciler.reconcile_files(&bad_path, &ledger_path).await;
    match bad {
        Err(err @ ReconError::Load { .. }) => assert!(err.to_string().contains("bad.csv")),
        other => panic!("expected load error, got {:?}", other.map(|r| r.run_id)),
    }
}

#[test]
fn test_tolerance_boundary() {
    let ledger = RawTable::from_rows(
        &["InvoiceID", "MonthlyRent", "PaymentReference"],
        &[&["I1", "100.00", "AB-1"]],
    );
    let within = RawTable::from_rows(
        &["TransactionID", "AmountPaid", "Reference"],
        &[&["T1", "100.049", "AB-1"]],
    );
    let at_tolerance = RawTable::from_rows(
        &["TransactionID", "AmountPaid", "Reference"],
        &[&["T1", "100.05", "AB-1"]],
    );

    assert_eq!(match_ledgers(&within, &ledger).matches.len(), 1);
    assert!(match_ledgers(&at_tolerance, &ledger).matches.is_empty());
}

#[test]
fn test_matching_is_idempotent_and_partitions_inputs() {
    let bank = RawTable::read(BANK_CSV.as_bytes()).unwrap();
    let ledger = RawTable::read(LEDGER_CSV.as_bytes()).unwrap();

    let first = match_ledgers(&bank, &ledger);
    let second = match_ledgers(&bank, &ledger);
    assert_eq!(first, second);

    assert_eq!(first.matches.len() + first.unmatched_txns.len(), bank.len());
    assert_eq!(first.matches.len() + first.unmatched_invs.len(), ledger.len());
}

#[test]
fn test_high_value_threshold_over_ten_amounts() {
    let rows: Vec<Vec<String>> = (1..=10)
        .map(|i| vec![format!("T{}", i), (i * 10).to_string()])
        .collect();
    let row_refs: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    let slices: Vec<&[&str]> = row_refs.iter().map(Vec::as_slice).collect();
    let bank = RawTable::from_rows(&["TransactionID", "AmountPaid"], &slices);
    let no_rows: &[&[&str]] = &[];
    let ledger = RawTable::from_rows(&["InvoiceID"], no_rows);

    let outcome = match_ledgers(&bank, &ledger);
    let findings = compute_findings(&outcome.matches, &outcome.unmatched_txns, &outcome.unmatched_invs);
    let flagged = findings.transactions(FindingCategory::HighValueUnmatched);
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].amount, BigDecimal::from_str("100").ok());
    assert!(findings.get(FindingCategory::DuplicateTxn).is_empty());
}

/// Flags every leftover transaction as a duplicate
struct FlagAllPass;

impl MatchPass for FlagAllPass {
    fn name(&self) -> &str {
        "flag_all"
    }

    fn apply(&self, pools: &mut MatchPools<'_>) {
        let flagged = pools
            .unmatched_txn_indices()
            .into_iter()
            .map(|idx| pools.transactions()[idx].clone())
            .collect();
        pools.record_finding(FindingCategory::DuplicateTxn, FindingSet::Transactions(flagged));
    }
}

#[tokio::test]
async fn test_non_empty_matcher_findings_take_precedence() {
    let bank = RawTable::read(BANK_CSV.as_bytes()).unwrap();
    let ledger = RawTable::read(LEDGER_CSV.as_bytes()).unwrap();
    let engine = ReconciliationEngine::new().with_secondary(Box::new(FlagAllPass));
    let reconciler =
        Reconciler::new(FixedSummarizer::new("ok"), MemoryPublisher::new()).with_engine(engine);

    let report = reconciler.reconcile(&bank, &ledger).await;
    assert_eq!(report.stats.rule_findings.count(FindingCategory::DuplicateTxn), 2);
    assert_eq!(report.stats.matcher_findings.count(FindingCategory::DuplicateTxn), 3);
    assert_eq!(report.result.findings.count(FindingCategory::DuplicateTxn), 3);
    assert_eq!(report.stats.counts.dup_txn, 3);
    // Rule-only category still arrives
    assert_eq!(report.result.findings.count(FindingCategory::HighValueUnmatched), 1);
}

#[tokio::test]
async fn test_gemini_summary_from_api() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Call Thandi about LEASE-303."}]}}]}"#,
    )
    .await;
    let config = IntegrationConfig {
        api_base: base,
        ..IntegrationConfig::default()
    }
    .with_api_key("test-key")
    .with_retry(RetryPolicy::no_retry());

    let bank = RawTable::read(BANK_CSV.as_bytes()).unwrap();
    let ledger = RawTable::read(LEDGER_CSV.as_bytes()).unwrap();
    let reconciler = Reconciler::new(DefaultSummarizer::from_config(&config), MemoryPublisher::new());
    let report = reconciler.reconcile(&bank, &ledger).await;

    assert_eq!(report.summary, "Call Thandi about LEASE-303.");
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /models/gemini-2.0-flash:generateContent?key=test-key"));
    assert!(request.contains("Thandi Nkosi"));
    assert!(request.contains("maxOutputTokens"));
}

#[tokio::test]
async fn test_gemini_error_status_falls_back() {
    let (base, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
    let config = IntegrationConfig {
        api_base: base,
        ..IntegrationConfig::default()
    }
    .with_api_key("test-key")
    .with_retry(RetryPolicy::no_retry());

    let summarizer = DefaultSummarizer::from_config(&config);
    let bank = RawTable::read(BANK_CSV.as_bytes()).unwrap();
    let ledger = RawTable::read(LEDGER_CSV.as_bytes()).unwrap();
    let stats = Reconciler::new(LocalSummarizer, MemoryPublisher::new())
        .reconcile(&bank, &ledger)
        .await
        .stats;

    let summary = summarizer.summarize(&stats).await;
    assert!(summary.starts_with(&rent_recon_core::local_fallback()));
    assert!(summary.contains("API Error"));
    assert!(summary.contains("500"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_webhook_receives_summary() {
    let (base, server) = serve_once("200 OK", "{}").await;
    let dir = TempDir::new().unwrap();
    let config = IntegrationConfig::default()
        .with_reports_dir(dir.path())
        .with_webhook_url(format!("{}/hook", base))
        .with_retry(RetryPolicy::no_retry());

    let reconciler = Reconciler::new(FixedSummarizer::new("Chase I3"), ReportPublisher::from_config(&config));
    let bank = RawTable::read(BANK_CSV.as_bytes()).unwrap();
    let ledger = RawTable::read(LEDGER_CSV.as_bytes()).unwrap();
    let report = reconciler.reconcile(&bank, &ledger).await;
    let outcome = reconciler.publish(&report).await;

    assert!(outcome.is_clean());
    assert!(outcome.notified);
    assert_eq!(outcome.files.len(), 3);
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /hook"));
    assert!(request.contains(r#"{"text":"Chase I3"}"#));
}
