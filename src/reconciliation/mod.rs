//! Reconciliation of bank transactions against rent invoices
//!
//! Matching runs as a primary and secondary [`MatchPass`](crate::traits::MatchPass)
//! over shared pools; rule findings are computed over the leftovers and
//! merged with whatever the matcher reported.

pub mod core;
pub mod findings;
pub mod fuzzy;
pub mod matcher;
pub mod report;

pub use self::core::*;
pub use findings::*;
pub use fuzzy::*;
pub use matcher::*;
pub use report::*;
