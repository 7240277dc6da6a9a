//! # Rent Reconciliation Core
//!
//! Reconciles a landlord's bank statement against the rent ledger: pairs
//! incoming payments with expected invoices, classifies what is left over,
//! and hands the result to a summarizer and a publisher.
//!
//! ## Features
//!
//! - **Tolerant ingestion**: column aliases, missing columns synthesized as nulls, unparsable cells become nulls
//! - **Reference matching**: payment references extracted from free text, matched with a 0.05 amount tolerance
//! - **Pluggable passes**: a secondary matching strategy over the primary pass's leftovers
//! - **Findings**: duplicate transactions, high-value unmatched payments, partial payments
//! - **Action plans**: Gemini-generated summaries with a deterministic local fallback
//! - **Publishing**: CSV reports and an optional chat webhook
//!
//! ## Quick Start
//!
//! ```rust
//! use rent_recon_core::{match_ledgers, MatchType, RawTable};
//!
//! let bank = RawTable::from_rows(
//!     &["TransactionID", "AmountPaid", "Description"],
//!     &[&["T1", "1500.00", "Rent payment LEASE-104"]],
//! );
//! let ledger = RawTable::from_rows(
//!     &["InvoiceID", "TenantName", "MonthlyRent", "PaymentReference"],
//!     &[&["I1", "Jane Doe", "1500", "lease-104"]],
//! );
//!
//! let outcome = match_ledgers(&bank, &ledger);
//! assert_eq!(outcome.matches.len(), 1);
//! assert_eq!(outcome.matches[0].match_type, MatchType::ExactRef);
//! ```
//!
//! Full runs go through [`Reconciler`], which also computes findings,
//! requests a summary and publishes the reports.

pub mod ingest;
pub mod integrations;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use ingest::*;
pub use integrations::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
