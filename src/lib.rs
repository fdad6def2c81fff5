//! Intake: questionnaire submission intake and enrichment engine
//!
//! Turns a completed questionnaire into a persisted, progressively
//! enriched submission record: deterministic segment classification, a
//! sequential generative enrichment pipeline with a self-healing read
//! path, and a best-effort mirror into an external relationship index.
//!
//! # Core Concepts
//!
//! - **Submission**: one persisted record per questionnaire response
//! - **Classification**: pure, reproducible scoring of answers into
//!   segment categories, with disqualification flags
//! - **Enrichment slots**: structured generated content, each written by
//!   exactly one task, serialized per submission id
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use intake::{MockGenerator, OpenStore, SqliteRecordStore, SubmissionService};
//!
//! let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
//! let client = Arc::new(MockGenerator::new());
//! let service = SubmissionService::new(store, client);
//! // Service is ready for use
//! # let _ = service;
//! ```

pub mod classify;
pub mod generate;
pub mod mirror;
pub mod orchestrate;
pub mod service;
pub mod store;
pub mod submission;
pub mod task;

pub use classify::{Category, Classification, Readiness};
pub use generate::{GenerateError, GenerateRequest, GenerativeClient, HttpGenerator, MockGenerator};
pub use mirror::{IndexEntry, MemoryIndex, RelationshipIndex, SyncOutcome};
pub use orchestrate::{BackfillOutcome, Orchestrator, PlanReport, StepOutcome};
pub use service::{CreateOutcome, ServiceError, SubmissionService};
pub use store::{OpenStore, RecordStore, SqliteRecordStore, StoreError, StoreResult};
pub use submission::{
    Answer, NewSubmission, SegmentFamily, Submission, SubmissionId, SubmissionSummary,
};
pub use task::{EnrichmentTask, FailurePolicy, TaskCatalog, TaskError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
