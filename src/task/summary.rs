//! Summary task — a one-line internal note for the relationship index
//!
//! Failure policy is Continue: an account note is never worth blocking
//! the rest of a plan for.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::parse::{extract_json, record_context};
use super::traits::{EnrichmentTask, FailurePolicy, TaskError};
use super::SUMMARY_SLOT;
use crate::generate::{clip, GenerateRequest, GenerativeClient};
use crate::submission::Submission;

/// Structured result for the `summary` slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Accept "note" or "text" (generator fallbacks) for the summary
    #[serde(alias = "note", alias = "text")]
    pub summary: String,
}

/// Generates a one-line account note from the submission.
pub struct SummaryTask {
    client: Arc<dyn GenerativeClient>,
}

impl SummaryTask {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }

    fn build_request(&self, record: &Submission) -> GenerateRequest {
        GenerateRequest {
            instruction: "Summarize this submission in one sentence for an internal account \
                          note: who they are, their dominant category, and anything notable. \
                          Respond as a JSON object with a \"summary\" field, or as plain text."
                .to_string(),
            payload: record_context(record),
            slot: SUMMARY_SLOT.to_string(),
        }
    }

    /// The slot wants one line of text, so a plain-text response is
    /// accepted as-is when no JSON object is present.
    fn parse_response(&self, raw: &str) -> Result<serde_json::Value, TaskError> {
        if let Some(value) = extract_json(raw) {
            let parsed: AccountSummary =
                serde_json::from_value(value).map_err(|e| TaskError::Parse {
                    reason: e.to_string(),
                    raw: clip(raw, 200),
                })?;
            if parsed.summary.trim().is_empty() {
                return Err(TaskError::Parse {
                    reason: "summary must be non-empty".to_string(),
                    raw: clip(raw, 200),
                });
            }
            return Ok(serde_json::to_value(parsed).expect("summary serializes"));
        }

        // Plain-text fallback: first non-empty line
        let line = raw.lines().map(str::trim).find(|l| !l.is_empty());
        match line {
            Some(line) => Ok(serde_json::json!({ "summary": clip(line, 300) })),
            None => Err(TaskError::Parse {
                reason: "empty response".to_string(),
                raw: clip(raw, 200),
            }),
        }
    }
}

#[async_trait]
impl EnrichmentTask for SummaryTask {
    fn slot(&self) -> &'static str {
        SUMMARY_SLOT
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Continue
    }

    async fn run(&self, record: &Submission) -> Result<serde_json::Value, TaskError> {
        let request = self.build_request(record);
        let raw = self.client.complete(&request).await?;
        self.parse_response(&raw)
    }
}
