//! Configuration for the summarizer and publisher collaborators

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::integrations::retry::RetryPolicy;
use crate::reconciliation::report::DEFAULT_SAMPLE_ROWS;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Settings handed to collaborators at construction time
///
/// `api_key` enables remote summarization and `webhook_url` enables chat
/// notification; leaving either unset selects the local behaviour.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub api_key: Option<String>,
    pub webhook_url: Option<String>,
    pub model: String,
    pub api_base: String,
    /// Where CSV reports are written
    pub reports_dir: PathBuf,
    /// Per-request timeout for outbound calls
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Unmatched rows per side included in the statistics bundle
    pub sample_rows: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            webhook_url: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            reports_dir: PathBuf::from("reports"),
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_output_tokens: 800,
            temperature: 0.4,
        }
    }
}

/// Stand-in printed for secrets in `Debug` output
pub(crate) const REDACTED: &str = "<redacted>";

impl fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("webhook_url", &self.webhook_url)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("reports_dir", &self.reports_dir)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("sample_rows", &self.sample_rows)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl IntegrationConfig {
    /// Read settings from the process environment, loading `.env` first if present
    ///
    /// Recognized variables: `GEMINI_API_KEY`, `SLACK_WEBHOOK_URL`,
    /// `GEMINI_MODEL`, `RECON_REPORTS_DIR`. Blank values count as unset.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            api_key: non_blank_var("GEMINI_API_KEY"),
            webhook_url: non_blank_var("SLACK_WEBHOOK_URL"),
            model: non_blank_var("GEMINI_MODEL").unwrap_or(defaults.model),
            reports_dir: non_blank_var("RECON_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            ..defaults
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn non_blank_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
