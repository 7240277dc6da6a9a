//! In-memory collaborators for testing

use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};

use crate::traits::*;
use crate::types::*;

/// Owned copy of one publish request
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedReport {
    pub matches: Vec<Match>,
    pub unmatched_txns: Vec<BankTransaction>,
    pub unmatched_invs: Vec<Invoice>,
    pub summary: String,
}

/// Publisher that records every request instead of sending it anywhere
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    published: Arc<RwLock<Vec<PublishedReport>>>,
}

impl MemoryPublisher {
    /// Create a new memory publisher instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first
    pub fn published(&self) -> Vec<PublishedReport> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear all recorded requests (useful for testing)
    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, request: PublishRequest<'_>) -> PublishOutcome {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedReport {
                matches: request.matches.to_vec(),
                unmatched_txns: request.unmatched_txns.to_vec(),
                unmatched_invs: request.unmatched_invs.to_vec(),
                summary: request.summary.to_string(),
            });
        PublishOutcome::default()
    }
}

/// Summarizer that always answers with the same text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSummarizer {
    text: String,
}

impl FixedSummarizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _stats: &ReportStats) -> String {
        self.text.clone()
    }
}
