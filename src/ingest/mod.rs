//! Ingestion: raw CSV tables and their normalization into typed records

pub mod normalize;
pub mod table;

pub use normalize::*;
pub use table::*;
