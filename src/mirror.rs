//! Relationship index mirror — best-effort sync into an external
//! CRM-style index
//!
//! The index is never authoritative: no read path in the crate depends
//! on it, and every failure here is logged and absorbed. A failed lookup
//! skips the sync entirely rather than risk inserting a duplicate entry.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::submission::{Submission, SubmissionId};
use crate::task::SUMMARY_SLOT;

/// Environment variable naming the index endpoint
pub const INDEX_ENV: &str = "INTAKE_INDEX_URL";
/// Environment variable holding the index bearer token
pub const INDEX_TOKEN_ENV: &str = "INTAKE_INDEX_TOKEN";
/// Upper bound for a single index call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The index's own identifier for a mirrored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalRef(pub String);

impl std::fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Denormalized mirror of one submission, fully derived from the record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub submission_id: SubmissionId,
    pub display_name: String,
    /// Dominant category code, when classified
    pub display_category: Option<String>,
    /// One-line account note from the summary slot, when populated
    pub note: Option<String>,
    /// Full record document at sync time
    pub snapshot: serde_json::Value,
}

impl IndexEntry {
    /// Derive the mirror entry from a record.
    pub fn for_submission(record: &Submission) -> Self {
        let display_name = record
            .contact("name")
            .or_else(|| record.contact("company"))
            .unwrap_or("(unknown)")
            .to_string();

        let display_category = record
            .classification
            .as_ref()
            .and_then(|c| c.dominant)
            .map(|c| c.to_string());

        let note = record
            .slot(SUMMARY_SLOT)
            .and_then(|v| v.get("summary"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Self {
            submission_id: record.id.clone(),
            display_name,
            display_category,
            note,
            snapshot: serde_json::to_value(record).expect("record serializes"),
        }
    }
}

/// Errors from relationship index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index transport failure: {0}")]
    Transport(String),

    #[error("index rejected the request: {0}")]
    Rejected(String),
}

/// Client trait for the external relationship index.
#[async_trait]
pub trait RelationshipIndex: Send + Sync {
    /// Look up the index's ref for a submission, if mirrored before.
    async fn find(&self, id: &SubmissionId) -> Result<Option<ExternalRef>, IndexError>;

    /// Create a new entry, returning the index's ref for it.
    async fn insert(&self, entry: &IndexEntry) -> Result<ExternalRef, IndexError>;

    /// Overwrite an existing entry.
    async fn update(&self, external: &ExternalRef, entry: &IndexEntry) -> Result<(), IndexError>;
}

/// What a sync attempt did. Failures are absorbed, never propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Inserted,
    Updated,
    /// Lookup failed; sync skipped so a duplicate can never be inserted
    SkippedLookupFailed,
    /// Write failed; logged and dropped
    Failed,
}

/// Mirror one record into the index: search, then patch or insert.
pub async fn sync_submission(index: &dyn RelationshipIndex, record: &Submission) -> SyncOutcome {
    let entry = IndexEntry::for_submission(record);

    let existing = match index.find(&record.id).await {
        Ok(existing) => existing,
        Err(err) => {
            tracing::warn!(id = %record.id, error = %err, "index lookup failed, skipping sync");
            return SyncOutcome::SkippedLookupFailed;
        }
    };

    match existing {
        Some(external) => match index.update(&external, &entry).await {
            Ok(()) => {
                tracing::debug!(id = %record.id, external = %external, "index entry updated");
                SyncOutcome::Updated
            }
            Err(err) => {
                tracing::warn!(id = %record.id, error = %err, "index update failed");
                SyncOutcome::Failed
            }
        },
        None => match index.insert(&entry).await {
            Ok(external) => {
                tracing::debug!(id = %record.id, external = %external, "index entry created");
                SyncOutcome::Inserted
            }
            Err(err) => {
                tracing::warn!(id = %record.id, error = %err, "index insert failed");
                SyncOutcome::Failed
            }
        },
    }
}

/// In-process index for tests: a map plus switchable failure injection
/// and call counters.
pub struct MemoryIndex {
    entries: DashMap<String, (ExternalRef, IndexEntry)>,
    next_ref: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    fail_lookups: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_ref: AtomicUsize::new(1),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            fail_lookups: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every `find` fail until switched back.
    pub fn fail_lookups(&self, on: bool) {
        self.fail_lookups.store(on, Ordering::SeqCst);
    }

    /// Make every `insert`/`update` fail until switched back.
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry_for(&self, id: &SubmissionId) -> Option<IndexEntry> {
        self.entries.get(id.as_str()).map(|e| e.value().1.clone())
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationshipIndex for MemoryIndex {
    async fn find(&self, id: &SubmissionId) -> Result<Option<ExternalRef>, IndexError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(IndexError::Transport("injected lookup failure".to_string()));
        }
        Ok(self.entries.get(id.as_str()).map(|e| e.value().0.clone()))
    }

    async fn insert(&self, entry: &IndexEntry) -> Result<ExternalRef, IndexError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::Transport("injected write failure".to_string()));
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let external = ExternalRef(format!("mem-{}", self.next_ref.fetch_add(1, Ordering::SeqCst)));
        self.entries.insert(
            entry.submission_id.as_str().to_string(),
            (external.clone(), entry.clone()),
        );
        Ok(external)
    }

    async fn update(&self, external: &ExternalRef, entry: &IndexEntry) -> Result<(), IndexError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IndexError::Transport("injected write failure".to_string()));
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(
            entry.submission_id.as_str().to_string(),
            (external.clone(), entry.clone()),
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    results: Vec<LookupHit>,
}

#[derive(Debug, Deserialize)]
struct LookupHit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    id: String,
}

/// HTTP relationship index: search, create and patch endpoints under one
/// base URL.
pub struct HttpRelationshipIndex {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpRelationshipIndex {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read endpoint and token from the environment.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(INDEX_ENV).ok()?;
        let mut index = Self::new(base_url);
        if let Ok(token) = std::env::var(INDEX_TOKEN_ENV) {
            if !token.is_empty() {
                index = index.with_token(token);
            }
        }
        Some(index)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-call timeout and bearer token, applied to every request.
    fn prepare(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.timeout(self.timeout);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn transport(&self, err: reqwest::Error) -> IndexError {
        if err.is_timeout() {
            IndexError::Transport(format!("index call timed out after {:?}", self.timeout))
        } else {
            IndexError::Transport(err.to_string())
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, IndexError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IndexError::Rejected(format!(
            "{}: {}",
            status,
            crate::generate::clip(&body, 200)
        )))
    }
}

#[async_trait]
impl RelationshipIndex for HttpRelationshipIndex {
    async fn find(&self, id: &SubmissionId) -> Result<Option<ExternalRef>, IndexError> {
        let url = format!("{}/entries", self.base_url);
        let response = self
            .prepare(self.http.get(&url).query(&[("submission_id", id.as_str())]))
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let parsed: LookupResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.transport(e))?;

        Ok(parsed.results.into_iter().next().map(|hit| ExternalRef(hit.id)))
    }

    async fn insert(&self, entry: &IndexEntry) -> Result<ExternalRef, IndexError> {
        let url = format!("{}/entries", self.base_url);
        let response = self
            .prepare(self.http.post(&url).json(entry))
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let parsed: InsertResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| self.transport(e))?;

        Ok(ExternalRef(parsed.id))
    }

    async fn update(&self, external: &ExternalRef, entry: &IndexEntry) -> Result<(), IndexError> {
        let url = format!("{}/entries/{}", self.base_url, external);
        let response = self
            .prepare(self.http.patch(&url).json(entry))
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        Self::check(response).await?;
        Ok(())
    }
}
