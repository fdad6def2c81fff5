//! Enrichment task trait and error taxonomy

use async_trait::async_trait;

use crate::generate::GenerateError;
use crate::submission::Submission;

/// How the orchestrator reacts when a task fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the remaining sequence and surface the error
    Abort,
    /// Log, leave the slot empty, move on to the next task
    Continue,
}

/// Errors from one enrichment task execution.
///
/// Transport and Parse are deliberately distinct: a transport failure
/// says nothing about the content, while a parse failure carries the
/// raw text (bounded) so the response can be inspected and the task
/// re-invoked by hand.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("transport failure: {0}")]
    Transport(#[from] GenerateError),

    #[error("unusable response ({reason}): {raw}")]
    Parse { reason: String, raw: String },

    #[error("precondition not met: {0}")]
    Precondition(String),
}

/// One enrichment step: owns a slot, builds its request from record
/// content, and parses the untrusted response into the slot value.
#[async_trait]
pub trait EnrichmentTask: Send + Sync {
    /// Enrichment slot this task writes. Stable identifier.
    fn slot(&self) -> &'static str;

    /// Failure policy the orchestrator applies to this task
    fn policy(&self) -> FailurePolicy;

    /// Whether a read on a record whose plan includes this task should
    /// backfill the slot when it is missing
    fn expected_on_read(&self) -> bool {
        false
    }

    /// Execute the task against a record. Returns the structured value
    /// for the slot; never writes anything itself.
    async fn run(&self, record: &Submission) -> Result<serde_json::Value, TaskError>;
}
