//! Submission service — the single entry point transports embed
//!
//! `SubmissionService` validates and classifies new submissions, owns the
//! enrichment orchestrator and the optional relationship-index mirror,
//! and serves the self-healing read path. Transports (CLI, embedding
//! applications) call service methods; they never reach into the store
//! or orchestrator directly.

use std::sync::Arc;

use thiserror::Error;

use crate::classify::{self, Classification};
use crate::generate::GenerativeClient;
use crate::mirror::{sync_submission, RelationshipIndex, SyncOutcome};
use crate::orchestrate::{OrchestrateError, Orchestrator, PlanReport};
use crate::store::{RecordStore, StoreError};
use crate::submission::{NewSubmission, Submission, SubmissionId, SubmissionSummary};
use crate::task::{TaskCatalog, TaskError};

/// Caller-facing error taxonomy.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed create input
    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("submission not found: {0}")]
    NotFound(SubmissionId),

    #[error("unknown task slot: {0}")]
    UnknownSlot(String),

    /// A required external capability has no endpoint configured
    #[error("not configured: {0}")]
    Configuration(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<OrchestrateError> for ServiceError {
    fn from(err: OrchestrateError) -> Self {
        match err {
            OrchestrateError::NotFound(id) => Self::NotFound(id),
            OrchestrateError::UnknownSlot(slot) => Self::UnknownSlot(slot),
            OrchestrateError::Task(e) => Self::Task(e),
            OrchestrateError::Store(e) => Self::Storage(e),
        }
    }
}

/// What `create` hands back once the record is durable
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub id: SubmissionId,
    pub classification: Classification,
}

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct SubmissionService {
    store: Arc<dyn RecordStore>,
    orchestrator: Arc<Orchestrator>,
    index: Option<Arc<dyn RelationshipIndex>>,
    background_enrichment: bool,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn RecordStore>, client: Arc<dyn GenerativeClient>) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            TaskCatalog::standard(client),
        ));
        Self {
            store,
            orchestrator,
            index: None,
            background_enrichment: true,
        }
    }

    /// Mirror records into a relationship index after enrichment.
    pub fn with_index(mut self, index: Arc<dyn RelationshipIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Toggle the post-create pipeline (plan run + mirror sync). On by
    /// default; callers that drive enrichment explicitly turn it off.
    pub fn with_background_enrichment(mut self, enabled: bool) -> Self {
        self.background_enrichment = enabled;
        self
    }

    // --- Write ---

    /// Validate, classify, and durably store a new submission.
    ///
    /// Returns as soon as the record is durable. With background
    /// enrichment on, the plan run and mirror sync are spawned; their
    /// failures are logged, never surfaced here.
    pub async fn create(&self, new: NewSubmission) -> Result<CreateOutcome, ServiceError> {
        validate(&new)?;

        let classification = classify::classify(&new.answers, &new.contact_details);
        let record = self.store.create(new, classification.clone())?;
        tracing::info!(
            id = %record.id,
            family = %record.segment_family,
            status = ?classification.status,
            "submission created"
        );

        if self.background_enrichment {
            let service = self.clone();
            let id = record.id.clone();
            tokio::spawn(async move { service.enrich_and_mirror(&id).await });
        }

        Ok(CreateOutcome {
            id: record.id,
            classification,
        })
    }

    /// Run the record's full enrichment plan now, inline.
    pub async fn run_plan(&self, id: &SubmissionId) -> Result<PlanReport, ServiceError> {
        Ok(self.orchestrator.run_plan(id).await?)
    }

    /// Explicitly (re)generate one enrichment slot.
    pub async fn run_task(
        &self,
        id: &SubmissionId,
        slot: &str,
    ) -> Result<serde_json::Value, ServiceError> {
        Ok(self.orchestrator.run_task(id, slot).await?)
    }

    /// Run one task against a caller-supplied submission without touching
    /// the store. The input is classified first, so the task sees the
    /// same context a stored record would carry.
    pub async fn run_task_detached(
        &self,
        new: NewSubmission,
        slot: &str,
    ) -> Result<serde_json::Value, ServiceError> {
        validate(&new)?;
        let classification = classify::classify(&new.answers, &new.contact_details);
        let record = Submission::from_new(new, classification);
        Ok(self.orchestrator.run_detached(&record, slot).await?)
    }

    /// Recompute the classification from the stored answers and persist
    /// it, under the id lock like every other mutation.
    pub async fn reclassify(&self, id: &SubmissionId) -> Result<Classification, ServiceError> {
        let _guard = self.orchestrator.lock_for(id).await;

        let mut record = self
            .store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        let classification = classify::classify(&record.answers, &record.contact_details);
        record.classification = Some(classification.clone());
        self.store.put(&record)?;
        tracing::info!(id = %id, status = ?classification.status, "submission reclassified");
        Ok(classification)
    }

    /// Push one record into the relationship index now.
    pub async fn sync_index(&self, id: &SubmissionId) -> Result<SyncOutcome, ServiceError> {
        let index = self.index.as_ref().ok_or_else(|| {
            ServiceError::Configuration("no relationship index configured".to_string())
        })?;
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        Ok(sync_submission(index.as_ref(), &record).await)
    }

    // --- Read ---

    /// Read a submission, backfilling a missing read-due slot first.
    ///
    /// Occasionally slower and mutating: when the record's plan expects a
    /// slot on read and it is absent, exactly that task runs (under the
    /// id lock, re-checked after acquiring) before the re-read record is
    /// returned. A failed backfill degrades to the record as stored.
    pub async fn get(&self, id: &SubmissionId) -> Result<Submission, ServiceError> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;

        let due = self.orchestrator.due_on_read(&record);
        if due.is_empty() {
            return Ok(record);
        }

        for slot in due {
            if let Err(err) = self.orchestrator.ensure_slot(id, slot).await {
                tracing::warn!(id = %id, slot, error = %err, "read-path backfill failed");
            }
        }

        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))
    }

    /// The classification for a submission. Recomputed on the fly when a
    /// record somehow lacks one; the function is pure, so the result is
    /// what creation would have stored.
    pub async fn classification(&self, id: &SubmissionId) -> Result<Classification, ServiceError> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        match record.classification {
            Some(classification) => Ok(classification),
            None => Ok(classify::classify(&record.answers, &record.contact_details)),
        }
    }

    /// Most recent submissions, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<SubmissionSummary>, ServiceError> {
        Ok(self.store.list_recent(limit)?)
    }

    // --- Internal ---

    /// Post-create pipeline: full plan run, then best-effort mirror sync.
    async fn enrich_and_mirror(&self, id: &SubmissionId) {
        if let Err(err) = self.orchestrator.run_plan(id).await {
            tracing::warn!(id = %id, error = %err, "background enrichment failed");
        }
        if self.index.is_some() {
            if let Err(err) = self.sync_index(id).await {
                tracing::warn!(id = %id, error = %err, "background index sync failed");
            }
        }
    }
}

/// Reject create input the rest of the pipeline cannot work with.
fn validate(new: &NewSubmission) -> Result<(), ServiceError> {
    if new.answers.is_empty() {
        return Err(ServiceError::Validation(
            "submission has no answers".to_string(),
        ));
    }
    for (position, answer) in new.answers.iter().enumerate() {
        if answer.question_id.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "answer {} is missing a question id",
                position
            )));
        }
        if answer.value.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "answer '{}' is missing a value",
                answer.question_id
            )));
        }
    }
    Ok(())
}
