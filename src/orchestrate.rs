//! Enrichment orchestration: plan selection, sequential execution, and
//! per-submission mutual exclusion
//!
//! The store offers no compare-and-swap, so the only defense against one
//! task's write clobbering another's is to serialize all mutations per
//! submission id. Every mutating path acquires the id's async mutex from
//! `IdLocks` first; pipelines for different ids run fully independently.
//!
//! Within one plan, tasks run strictly in sequence: read the current
//! record, invoke the task, merge its result, persist, and only then move
//! to the next task. There is no automatic retry anywhere: a failed task
//! is recovered by the read-path backfill or an explicit re-invocation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{RecordStore, StoreError};
use crate::submission::{SegmentFamily, Submission, SubmissionId};
use crate::task::{
    FailurePolicy, TaskCatalog, TaskError, ACTION_PLAN_SLOT, REPORT_SLOT, SUMMARY_SLOT,
};

/// Ordered task slots for a segment family and readiness state.
///
/// Not-ready submissions get no respondent-facing content; the summary
/// note still runs for the long form so the account record stays useful.
pub fn plan_slots(family: SegmentFamily, ready: bool) -> &'static [&'static str] {
    match (family, ready) {
        (SegmentFamily::Assessment, true) => &[REPORT_SLOT, ACTION_PLAN_SLOT, SUMMARY_SLOT],
        (SegmentFamily::Assessment, false) => &[SUMMARY_SLOT],
        (SegmentFamily::Pulse, true) => &[REPORT_SLOT],
        (SegmentFamily::Pulse, false) => &[],
    }
}

/// Plan for a concrete record. A record without a classification is
/// treated as not ready.
pub fn plan_for(record: &Submission) -> &'static [&'static str] {
    let ready = record
        .classification
        .as_ref()
        .map(|c| c.is_ready())
        .unwrap_or(false);
    plan_slots(record.segment_family, ready)
}

/// Hands out one async mutex per submission id.
///
/// Entries are created on first use and removed again when the last
/// holder drops its guard, so the registry tracks in-flight ids only.
pub struct IdLocks {
    locks: DashMap<SubmissionId, Arc<Mutex<()>>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the id's lock, creating the registry entry on first use.
    pub async fn acquire(&self, id: &SubmissionId) -> IdGuard<'_> {
        let lock = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        IdGuard {
            locks: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }
}

impl Default for IdLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Held id lock. Dropping it releases the mutex and evicts the registry
/// entry unless another holder or waiter still references it.
pub struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: SubmissionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        // The guard owns an Arc to the mutex, so it has to go first for
        // the count check below to ever see a sole-owned entry. Any
        // waiter already holds its own Arc, and remove_if runs under
        // the shard lock, so no holder can appear mid-check.
        self.guard.take();
        self.locks
            .locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// What happened to one step of a plan run
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Result generated and persisted
    Written,
    /// Slot was already populated; no generation call made
    SkippedExisting,
    /// Task failed under the Continue policy; slot left empty
    Failed(String),
    /// Task failed under the Abort policy; the plan stopped here
    Aborted(String),
}

/// Per-step record of one plan run
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub steps: Vec<(&'static str, StepOutcome)>,
}

impl PlanReport {
    pub fn outcome(&self, slot: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == slot).map(|(_, o)| o)
    }

    /// True when no step aborted the sequence
    pub fn completed(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|(_, o)| matches!(o, StepOutcome::Aborted(_)))
    }
}

/// Outcome of a read-path backfill attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// The slot was generated and persisted by this call
    Generated,
    /// Another caller filled the slot first; nothing was done
    AlreadyPresent,
}

/// Errors from orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    #[error("record not found: {0}")]
    NotFound(SubmissionId),

    #[error("unknown task slot: {0}")]
    UnknownSlot(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs enrichment plans and single tasks against the record store,
/// one writer per submission id.
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    catalog: TaskCatalog,
    locks: IdLocks,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RecordStore>, catalog: TaskCatalog) -> Self {
        Self {
            store,
            catalog,
            locks: IdLocks::new(),
        }
    }

    /// Hold the submission id's lock. Shared with the service layer so
    /// every mutating path in the crate takes the same lock.
    pub(crate) async fn lock_for(&self, id: &SubmissionId) -> IdGuard<'_> {
        self.locks.acquire(id).await
    }

    /// Run the record's full plan in order, persisting after each task.
    ///
    /// Task failures are recorded per step and handled per policy; store
    /// failures abort the run as hard errors.
    pub async fn run_plan(&self, id: &SubmissionId) -> Result<PlanReport, OrchestrateError> {
        let _guard = self.locks.acquire(id).await;

        let mut record = self
            .store
            .get(id)?
            .ok_or_else(|| OrchestrateError::NotFound(id.clone()))?;

        let mut steps = Vec::new();
        for slot in plan_for(&record) {
            let task = self
                .catalog
                .get(slot)
                .ok_or_else(|| OrchestrateError::UnknownSlot(slot.to_string()))?;

            if record.slot(slot).is_some() {
                steps.push((*slot, StepOutcome::SkippedExisting));
                continue;
            }

            tracing::debug!(id = %id, slot, "running enrichment task");
            match task.run(&record).await {
                Ok(value) => {
                    record.set_slot(*slot, value);
                    self.store.put(&record)?;
                    steps.push((*slot, StepOutcome::Written));
                }
                Err(err) => match task.policy() {
                    FailurePolicy::Continue => {
                        tracing::warn!(id = %id, slot, error = %err, "task failed, continuing");
                        steps.push((*slot, StepOutcome::Failed(err.to_string())));
                    }
                    FailurePolicy::Abort => {
                        tracing::warn!(id = %id, slot, error = %err, "task failed, aborting plan");
                        steps.push((*slot, StepOutcome::Aborted(err.to_string())));
                        break;
                    }
                },
            }
        }

        let report = PlanReport { steps };
        tracing::info!(id = %id, completed = report.completed(), "enrichment plan finished");
        Ok(report)
    }

    /// Explicitly run one task and persist its slot, regenerating the
    /// slot if it was already populated.
    pub async fn run_task(
        &self,
        id: &SubmissionId,
        slot: &str,
    ) -> Result<serde_json::Value, OrchestrateError> {
        let task = self
            .catalog
            .get(slot)
            .ok_or_else(|| OrchestrateError::UnknownSlot(slot.to_string()))?;

        let _guard = self.locks.acquire(id).await;

        let mut record = self
            .store
            .get(id)?
            .ok_or_else(|| OrchestrateError::NotFound(id.clone()))?;

        let value = task.run(&record).await?;
        record.set_slot(slot, value.clone());
        self.store.put(&record)?;
        Ok(value)
    }

    /// Run one task against a caller-supplied record without touching the
    /// store. No lock, no persistence: the caller owns the result.
    pub async fn run_detached(
        &self,
        record: &Submission,
        slot: &str,
    ) -> Result<serde_json::Value, OrchestrateError> {
        let task = self
            .catalog
            .get(slot)
            .ok_or_else(|| OrchestrateError::UnknownSlot(slot.to_string()))?;
        Ok(task.run(record).await?)
    }

    /// Fill a missing slot, if still missing once the id lock is held.
    ///
    /// The re-check after acquiring is what turns two concurrent readers
    /// discovering the same gap into exactly one generation call.
    pub async fn ensure_slot(
        &self,
        id: &SubmissionId,
        slot: &str,
    ) -> Result<BackfillOutcome, OrchestrateError> {
        let task = self
            .catalog
            .get(slot)
            .ok_or_else(|| OrchestrateError::UnknownSlot(slot.to_string()))?;

        let _guard = self.locks.acquire(id).await;

        let mut record = self
            .store
            .get(id)?
            .ok_or_else(|| OrchestrateError::NotFound(id.clone()))?;

        if record.slot(slot).is_some() {
            return Ok(BackfillOutcome::AlreadyPresent);
        }

        let value = task.run(&record).await?;
        record.set_slot(slot, value);
        self.store.put(&record)?;
        tracing::info!(id = %id, slot, "backfilled missing slot");
        Ok(BackfillOutcome::Generated)
    }

    /// Slots the read path should backfill: in the record's plan, marked
    /// expected on read, and currently absent.
    pub fn due_on_read(&self, record: &Submission) -> Vec<&'static str> {
        plan_for(record)
            .iter()
            .copied()
            .filter(|slot| {
                self.catalog
                    .get(slot)
                    .map(|t| t.expected_on_read())
                    .unwrap_or(false)
                    && record.slot(slot).is_none()
            })
            .collect()
    }
}
