//! Reconcile a bank statement CSV against a rent ledger CSV
//!
//! ```text
//! cargo run --example reconcile_csv -- bank.csv ledger.csv
//! ```
//!
//! Set `GEMINI_API_KEY` for a generated action plan and `SLACK_WEBHOOK_URL`
//! to post it; both can live in a `.env` file.

use rent_recon_core::{FindingCategory, IntegrationConfig, Reconciler};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(bank_path), Some(ledger_path)) = (args.next(), args.next()) else {
        eprintln!("usage: reconcile_csv <bank.csv> <ledger.csv>");
        std::process::exit(2);
    };

    let config = IntegrationConfig::from_env();
    let reconciler = Reconciler::from_config(&config);

    println!("🏠 Rent Reconciliation\n");
    let report = reconciler.reconcile_files(&bank_path, &ledger_path).await?;
    let counts = &report.stats.counts;

    println!("📊 Run {}", report.run_id);
    println!("  ✓ Matches:               {}", counts.matches);
    println!("  ✗ Unidentified payments: {}", counts.unmatched_txn);
    println!("  ✗ Unpaid invoices:       {}", counts.unmatched_inv);
    println!("  ⚠ Possible duplicates:   {}", counts.dup_txn);
    println!(
        "  ⚠ High-value unmatched:  {}",
        report
            .result
            .findings
            .count(FindingCategory::HighValueUnmatched)
    );
    println!();

    println!("📝 Action Plan\n{}\n", report.summary);

    let outcome = reconciler.publish(&report).await;
    for file in &outcome.files {
        println!("  ✓ Wrote {}", file.display());
    }
    if outcome.notified {
        println!("  ✓ Posted summary to webhook");
    }
    for error in &outcome.errors {
        println!("  ✗ {}", error);
    }

    Ok(())
}
