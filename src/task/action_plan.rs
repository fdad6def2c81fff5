//! Action plan task — recommended next steps, grounded in the report
//!
//! Structurally depends on the `report` slot: its request embeds the
//! report content, so running it against a record without one fails
//! before any generation call is made.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::parse::{extract_json, record_context};
use super::traits::{EnrichmentTask, FailurePolicy, TaskError};
use super::{ACTION_PLAN_SLOT, REPORT_SLOT};
use crate::generate::{clip, GenerateRequest, GenerativeClient};
use crate::submission::Submission;

/// One recommended step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Structured result for the `action_plan` slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    /// Accept "steps" (generator fallback) for the actions list
    #[serde(alias = "steps")]
    pub actions: Vec<ActionItem>,
}

/// Generates recommended next steps from the report and answers.
pub struct ActionPlanTask {
    client: Arc<dyn GenerativeClient>,
}

impl ActionPlanTask {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }

    fn build_request(&self, record: &Submission) -> Result<GenerateRequest, TaskError> {
        let report = record.slot(REPORT_SLOT).ok_or_else(|| {
            TaskError::Precondition(format!("'{REPORT_SLOT}' slot not populated"))
        })?;

        let mut payload = record_context(record);
        payload["report"] = report.clone();

        Ok(GenerateRequest {
            instruction: "Based on the report and the answers, recommend the next steps \
                          this respondent should take. Respond as a JSON object with an \
                          \"actions\" array; each action has a \"title\" and an optional \
                          \"detail\"."
                .to_string(),
            payload,
            slot: ACTION_PLAN_SLOT.to_string(),
        })
    }

    fn parse_response(&self, raw: &str) -> Result<serde_json::Value, TaskError> {
        let value = extract_json(raw).ok_or_else(|| TaskError::Parse {
            reason: "no JSON object in response".to_string(),
            raw: clip(raw, 200),
        })?;

        let mut plan: ActionPlan = serde_json::from_value(value).map_err(|e| TaskError::Parse {
            reason: e.to_string(),
            raw: clip(raw, 200),
        })?;

        // Untitled actions are noise; drop them rather than fail the lot
        plan.actions.retain(|a| !a.title.trim().is_empty());
        if plan.actions.is_empty() {
            return Err(TaskError::Parse {
                reason: "no usable actions in response".to_string(),
                raw: clip(raw, 200),
            });
        }

        Ok(serde_json::to_value(plan).expect("action plan serializes"))
    }
}

#[async_trait]
impl EnrichmentTask for ActionPlanTask {
    fn slot(&self) -> &'static str {
        ACTION_PLAN_SLOT
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }

    async fn run(&self, record: &Submission) -> Result<serde_json::Value, TaskError> {
        let request = self.build_request(record)?;
        let raw = self.client.complete(&request).await?;
        self.parse_response(&raw)
    }
}
