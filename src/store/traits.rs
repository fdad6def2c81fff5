//! Storage trait definitions

use std::path::Path;

use thiserror::Error;

use crate::classify::Classification;
use crate::submission::{NewSubmission, Submission, SubmissionId, SubmissionSummary};

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for submission record storage backends.
///
/// Implementations must be thread-safe (Send + Sync). The store offers
/// no compare-and-swap and no locking: concurrent `put` calls on one id
/// are last-writer-wins at document granularity, and callers that need
/// ordering must serialize their own writes.
pub trait RecordStore: Send + Sync {
    /// Create a record from submission input: assigns the id, stamps the
    /// creation time, writes durably, and returns the stored record.
    fn create(
        &self,
        new: NewSubmission,
        classification: Classification,
    ) -> StoreResult<Submission>;

    /// Load a record by id. None when the id is unknown.
    fn get(&self, id: &SubmissionId) -> StoreResult<Option<Submission>>;

    /// Overwrite the whole document for the record's id.
    fn put(&self, record: &Submission) -> StoreResult<()>;

    /// Most recently created records, newest first.
    fn list_recent(&self, limit: usize) -> StoreResult<Vec<SubmissionSummary>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: RecordStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StoreResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StoreResult<Self>;
}
