//! Action-plan summarizers
//!
//! [`GeminiSummarizer`] asks Google's Gemini API for a prioritized plan;
//! [`LocalSummarizer`] returns a fixed message and is what every failure
//! path degrades to.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::integrations::config::{IntegrationConfig, REDACTED};
use crate::integrations::retry::{retry_with_policy, RetryPolicy};
use crate::traits::Summarizer;
use crate::types::*;

/// Rows of each discrepancy list quoted in the prompt
const PROMPT_SAMPLE_ROWS: usize = 3;

/// Characters of a bank description quoted in the prompt
const DESCRIPTION_SNIPPET_CHARS: usize = 40;

/// Deterministic plan used when remote generation is unavailable
pub fn local_fallback() -> String {
    [
        "**[Action Plan: Local Fallback]** Remote summarization is not configured or did not respond.",
        "",
        "**Priority Actions:**",
        "1. Review the unpaid invoices list.",
        "2. Check partial payments for shortfalls.",
        "3. Manually reconcile unidentified payments.",
    ]
    .join("\n")
}

/// Errors from a remote summarization attempt
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summarizer not configured: {0}")]
    NotConfigured(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Empty response from model")]
    EmptyResponse,
}

fn rands(amount: Option<&BigDecimal>) -> String {
    match amount {
        Some(a) => format!("R{}", a.round(2).with_scale(2)),
        None => "R?".to_string(),
    }
}

/// Render the statistics bundle as a model prompt
pub fn build_prompt(stats: &ReportStats) -> String {
    let counts = &stats.counts;

    let mut unpaid: Vec<String> = stats
        .samples
        .unmatched_invs
        .iter()
        .take(PROMPT_SAMPLE_ROWS)
        .map(|inv| {
            format!(
                "- Tenant: {}, Amount Due: {}, Ref: {}",
                inv.customer.as_deref().unwrap_or("N/A"),
                rands(inv.amount.as_ref()),
                inv.reference.as_deref().unwrap_or("")
            )
        })
        .collect();
    if unpaid.is_empty() {
        unpaid.push("- All expected rent payments have been matched.".to_string());
    }

    let mut shortfalls: Vec<String> = stats
        .findings
        .partials()
        .iter()
        .map(|p| {
            format!(
                "- Tenant: {} (Invoice {}). Received {}.",
                p.customer.as_deref().unwrap_or("N/A"),
                p.invoice_id.as_deref().unwrap_or("N/A"),
                rands(Some(&p.received_total))
            )
        })
        .collect();
    if shortfalls.is_empty() {
        shortfalls.push("- No short or partial payments detected.".to_string());
    }

    let mut unidentified: Vec<String> = stats
        .samples
        .unmatched_txns
        .iter()
        .take(PROMPT_SAMPLE_ROWS)
        .map(|txn| {
            let description: String = txn
                .description
                .as_deref()
                .unwrap_or("")
                .trim()
                .chars()
                .take(DESCRIPTION_SNIPPET_CHARS)
                .collect();
            format!(
                "- TXN {}: {}, Desc: {}...",
                txn.txn_id.as_deref().unwrap_or("N/A"),
                rands(txn.amount.as_ref()),
                description
            )
        })
        .collect();
    if unidentified.is_empty() {
        unidentified.push("- No unidentified or extra payments to investigate.".to_string());
    }

    let mut lines = vec![
        "You are an operations assistant for a residential landlord in South Africa.".to_string(),
        "Write a prioritized action plan for the landlord.".to_string(),
        String::new(),
        "## STATUS COUNTS".to_string(),
        format!("- Matches: {}", counts.matches),
        format!("- Unpaid Invoices: {}", counts.unmatched_inv),
        format!("- Unidentified Payments: {}", counts.unmatched_txn),
        format!("- Possible Duplicates: {}", counts.dup_txn),
        String::new(),
        "## DISCREPANCY DATA".to_string(),
        "### UNPAID RENT".to_string(),
    ];
    lines.extend(unpaid);
    lines.push(String::new());
    lines.push("### PARTIAL PAYMENTS / SHORTFALLS".to_string());
    lines.extend(shortfalls);
    lines.push(String::new());
    lines.push("### UNIDENTIFIED PAYMENTS".to_string());
    lines.extend(unidentified);
    lines.extend([
        String::new(),
        "## OUTPUT FORMAT".to_string(),
        "1. One-sentence summary.".to_string(),
        "2. 3-5 prioritized actions.".to_string(),
        "3. 2 automation suggestions.".to_string(),
        "Use ZAR currency (R).".to_string(),
    ]);
    lines.join("\n")
}

/// Always answers with [`local_fallback`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSummarizer;

#[async_trait]
impl Summarizer for LocalSummarizer {
    async fn summarize(&self, _stats: &ReportStats) -> String {
        local_fallback()
    }
}

/// Gemini-backed summarizer
#[derive(Clone)]
pub struct GeminiSummarizer {
    api_key: String,
    model: String,
    api_base: String,
    max_output_tokens: u32,
    temperature: f32,
    retry: RetryPolicy,
    client: Client,
}

impl fmt::Debug for GeminiSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSummarizer")
            .field("api_key", &REDACTED)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GeminiSummarizer {
    /// Requires `api_key` to be set
    pub fn new(config: &IntegrationConfig) -> Result<Self, SummaryError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| SummaryError::NotConfigured("api_key is not set".to_string()))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SummaryError::NotConfigured(e.to_string()))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            retry: config.retry.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, self.api_key
        )
    }

    /// One generateContent round trip
    pub async fn generate(&self, prompt: &str) -> Result<String, SummaryError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
            },
        };

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending request to Gemini API");

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|e| SummaryError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::Api(format!("Gemini API error {}: {}", status, body)));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| SummaryError::Api(format!("Failed to parse response: {}", e)))?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .filter(|t| !t.trim().is_empty())
            .ok_or(SummaryError::EmptyResponse)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, stats: &ReportStats) -> String {
        let prompt = build_prompt(stats);
        match retry_with_policy(&self.retry, "gemini.generate_content", || {
            self.generate(&prompt)
        })
        .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Gemini summarization failed, using local fallback");
                format!("{}\n\n*(API Error: {})*", local_fallback(), e)
            }
        }
    }
}

/// Gemini when an API key is configured, local fallback otherwise
#[derive(Debug, Clone)]
pub enum DefaultSummarizer {
    Local(LocalSummarizer),
    Gemini(GeminiSummarizer),
}

impl DefaultSummarizer {
    pub fn from_config(config: &IntegrationConfig) -> Self {
        if config.api_key.is_none() {
            debug!("No API key configured, summaries will use the local fallback");
            return Self::Local(LocalSummarizer);
        }
        match GeminiSummarizer::new(config) {
            Ok(gemini) => Self::Gemini(gemini),
            Err(e) => {
                warn!(error = %e, "Could not build Gemini client, using local fallback");
                Self::Local(LocalSummarizer)
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Gemini(_))
    }
}

#[async_trait]
impl Summarizer for DefaultSummarizer {
    async fn summarize(&self, stats: &ReportStats) -> String {
        match self {
            Self::Local(local) => local.summarize(stats).await,
            Self::Gemini(gemini) => gemini.summarize(stats).await,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}
