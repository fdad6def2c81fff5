//! Report task — the respondent-facing assessment write-up
//!
//! First task in every plan that includes respondent-facing content,
//! and the one slot a read will backfill when it is missing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::parse::{extract_json, record_context};
use super::traits::{EnrichmentTask, FailurePolicy, TaskError};
use super::REPORT_SLOT;
use crate::generate::{clip, GenerateRequest, GenerativeClient};
use crate::submission::Submission;

/// Structured result for the `report` slot.
///
/// `headline` and `body` are required; a response missing either is a
/// parse failure no matter how plausible the rest looks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportContent {
    pub headline: String,
    pub body: String,
    /// Accept "focus_areas" (generator fallback) for the themes list
    #[serde(default, alias = "focus_areas")]
    pub themes: Vec<String>,
}

/// Generates the assessment report from answers and classification.
pub struct ReportTask {
    client: Arc<dyn GenerativeClient>,
}

impl ReportTask {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }

    fn build_request(&self, record: &Submission) -> GenerateRequest {
        GenerateRequest {
            instruction: "Write an assessment report for this questionnaire submission: \
                          a one-sentence headline, a short body addressed to the respondent \
                          in second person, and a list of the key themes. Respond as a JSON \
                          object with fields \"headline\", \"body\" and \"themes\"."
                .to_string(),
            payload: record_context(record),
            slot: REPORT_SLOT.to_string(),
        }
    }

    fn parse_response(&self, raw: &str) -> Result<serde_json::Value, TaskError> {
        let value = extract_json(raw).ok_or_else(|| TaskError::Parse {
            reason: "no JSON object in response".to_string(),
            raw: clip(raw, 200),
        })?;

        let content: ReportContent =
            serde_json::from_value(value).map_err(|e| TaskError::Parse {
                reason: e.to_string(),
                raw: clip(raw, 200),
            })?;

        if content.headline.trim().is_empty() || content.body.trim().is_empty() {
            return Err(TaskError::Parse {
                reason: "headline and body must be non-empty".to_string(),
                raw: clip(raw, 200),
            });
        }

        Ok(serde_json::to_value(content).expect("report content serializes"))
    }
}

#[async_trait]
impl EnrichmentTask for ReportTask {
    fn slot(&self) -> &'static str {
        REPORT_SLOT
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }

    fn expected_on_read(&self) -> bool {
        true
    }

    async fn run(&self, record: &Submission) -> Result<serde_json::Value, TaskError> {
        let request = self.build_request(record);
        let raw = self.client.complete(&request).await?;
        self.parse_response(&raw)
    }
}
