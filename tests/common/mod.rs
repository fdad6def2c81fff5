//! Common test utilities for intake integration tests
//!
//! Canned answer sets, mock generator wiring, and service setup shared
//! across the lifecycle, concurrency, and index sync suites.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use intake::classify::Classification;
use intake::generate::MockGenerator;
use intake::mirror::MemoryIndex;
use intake::store::{OpenStore, RecordStore, SqliteRecordStore, StoreResult};
use intake::submission::{
    Answer, NewSubmission, SegmentFamily, Submission, SubmissionId, SubmissionSummary,
};
use intake::task::{ACTION_PLAN_SLOT, REPORT_SLOT, SUMMARY_SLOT};
use intake::SubmissionService;

pub const REPORT_JSON: &str =
    r#"{"headline": "Positioned to move", "body": "The answers point to a team ready to commit.", "themes": ["speed", "ownership"]}"#;
pub const PLAN_JSON: &str =
    r#"{"actions": [{"title": "Book a scoping call", "detail": "Within two weeks"}]}"#;
pub const SUMMARY_JSON: &str = r#"{"summary": "Strong fit, decision authority confirmed."}"#;

/// Mock generator with a canned success for every catalog slot.
pub fn full_mock() -> MockGenerator {
    MockGenerator::new()
        .with_response(REPORT_SLOT, REPORT_JSON)
        .with_response(ACTION_PLAN_SLOT, PLAN_JSON)
        .with_response(SUMMARY_SLOT, SUMMARY_JSON)
}

/// In-memory service wired to the given mock, background pipeline off.
pub fn service_with(
    generator: MockGenerator,
) -> (Arc<MockGenerator>, Arc<SqliteRecordStore>, SubmissionService) {
    let generator = Arc::new(generator);
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    let service =
        SubmissionService::new(store.clone(), generator.clone()).with_background_enrichment(false);
    (generator, store, service)
}

/// Like `service_with`, plus an in-process relationship index.
pub fn service_with_index(
    generator: MockGenerator,
) -> (
    Arc<MockGenerator>,
    Arc<SqliteRecordStore>,
    Arc<MemoryIndex>,
    SubmissionService,
) {
    let generator = Arc::new(generator);
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    let index = Arc::new(MemoryIndex::new());
    let service = SubmissionService::new(store.clone(), generator.clone())
        .with_background_enrichment(false)
        .with_index(index.clone());
    (generator, store, index, service)
}

/// Store wrapper that counts whole-document writes.
pub struct CountingStore {
    inner: SqliteRecordStore,
    puts: AtomicUsize,
}

impl CountingStore {
    pub fn in_memory() -> Self {
        Self {
            inner: SqliteRecordStore::open_in_memory().unwrap(),
            puts: AtomicUsize::new(0),
        }
    }

    /// Number of `put` calls observed so far.
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl RecordStore for CountingStore {
    fn create(
        &self,
        new: NewSubmission,
        classification: Classification,
    ) -> StoreResult<Submission> {
        self.inner.create(new, classification)
    }

    fn get(&self, id: &SubmissionId) -> StoreResult<Option<Submission>> {
        self.inner.get(id)
    }

    fn put(&self, record: &Submission) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(record)
    }

    fn list_recent(&self, limit: usize) -> StoreResult<Vec<SubmissionSummary>> {
        self.inner.list_recent(limit)
    }
}

/// Like `service_with`, but the store counts document writes.
pub fn service_with_counting_store(
    generator: MockGenerator,
) -> (Arc<MockGenerator>, Arc<CountingStore>, SubmissionService) {
    let generator = Arc::new(generator);
    let store = Arc::new(CountingStore::in_memory());
    let service =
        SubmissionService::new(store.clone(), generator.clone()).with_background_enrichment(false);
    (generator, store, service)
}

/// Ten scored answers: A x6, B x2, C x1, D x1. No disqualifiers.
pub fn scenario_a_answers() -> Vec<Answer> {
    let codes = ["A", "A", "A", "A", "A", "A", "B", "B", "C", "D"];
    codes
        .iter()
        .enumerate()
        .map(|(i, code)| {
            Answer::new(
                format!("q{}", i + 1),
                format!("Question {}", i + 1),
                *code,
                format!("Option {}", code),
            )
        })
        .collect()
}

/// Three scored answers with decision authority; classifies Ready.
pub fn ready_answers() -> Vec<Answer> {
    vec![
        Answer::new("q1", "How quickly do you want to move?", "A", "This quarter"),
        Answer::new("q2", "Who makes the final decision?", "A", "I do"),
        Answer::new("q3", "Is budget allocated?", "B", "Partially"),
    ]
}

/// q2 = D carries the no-decision-authority disqualifier.
pub fn disqualified_answers() -> Vec<Answer> {
    vec![
        Answer::new("q1", "How quickly do you want to move?", "A", "This quarter"),
        Answer::new("q2", "Who makes the final decision?", "D", "Someone outside the team"),
    ]
}

pub fn input(family: SegmentFamily, answers: Vec<Answer>) -> NewSubmission {
    NewSubmission {
        segment_family: family,
        contact_details: BTreeMap::from([
            ("name".to_string(), "Dana Vos".to_string()),
            ("company".to_string(), "Vos Logistics".to_string()),
        ]),
        answers,
    }
}

pub fn input_with_contact(
    family: SegmentFamily,
    answers: Vec<Answer>,
    contact: &[(&str, &str)],
) -> NewSubmission {
    NewSubmission {
        segment_family: family,
        contact_details: contact
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        answers,
    }
}

/// Poll until the condition holds; panics after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
