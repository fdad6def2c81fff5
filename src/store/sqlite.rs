//! SQLite storage backend

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{OpenStore, RecordStore, StoreResult};
use crate::classify::Classification;
use crate::submission::{NewSubmission, Submission, SubmissionId, SubmissionSummary};

/// SQLite-backed record store
///
/// One row per submission: the full record as a JSON document plus the
/// columns needed for keyed lookup and listing. Thread-safe via an
/// internal mutex on the connection.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            -- Submission documents, one JSON blob per record
            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                segment_family TEXT NOT NULL,
                document TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_submissions_created_at
                ON submissions(created_at);

            -- WAL allows concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn parse_document(document: String) -> StoreResult<Submission> {
        Ok(serde_json::from_str(&document)?)
    }
}

impl RecordStore for SqliteRecordStore {
    fn create(
        &self,
        new: NewSubmission,
        classification: Classification,
    ) -> StoreResult<Submission> {
        let record = Submission::from_new(new, classification);
        let document = serde_json::to_string(&record)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO submissions (id, created_at, segment_family, document)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                record.id.as_str(),
                record.created_at.to_rfc3339(),
                record.segment_family.as_str(),
                document,
            ],
        )?;

        Ok(record)
    }

    fn get(&self, id: &SubmissionId) -> StoreResult<Option<Submission>> {
        let conn = self.conn.lock().unwrap();
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM submissions WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        document.map(Self::parse_document).transpose()
    }

    fn put(&self, record: &Submission) -> StoreResult<()> {
        let document = serde_json::to_string(record)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO submissions (id, created_at, segment_family, document)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                created_at = excluded.created_at,
                segment_family = excluded.segment_family,
                document = excluded.document
            "#,
            params![
                record.id.as_str(),
                record.created_at.to_rfc3339(),
                record.segment_family.as_str(),
                document,
            ],
        )?;

        Ok(())
    }

    fn list_recent(&self, limit: usize) -> StoreResult<Vec<SubmissionSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT document FROM submissions ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut summaries = Vec::new();
        for document in rows {
            let record = Self::parse_document(document?)?;
            summaries.push(SubmissionSummary::of(&record));
        }
        Ok(summaries)
    }
}

impl OpenStore for SqliteRecordStore {
    fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;
    use crate::submission::{Answer, SegmentFamily};
    use std::collections::BTreeMap;

    fn sample_new(family: SegmentFamily) -> NewSubmission {
        NewSubmission {
            segment_family: family,
            contact_details: BTreeMap::from([
                ("name".to_string(), "Robin".to_string()),
                ("company".to_string(), "Acme".to_string()),
            ]),
            answers: vec![
                Answer::new("q1", "How fast are you growing?", "A", "Fast"),
                Answer::new("q2", "Who decides?", "A", "I do"),
            ],
        }
    }

    fn sample_classification(new: &NewSubmission) -> Classification {
        classify::classify(&new.answers, &new.contact_details)
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let new = sample_new(SegmentFamily::Assessment);
        let classification = sample_classification(&new);

        let created = store.create(new, classification).unwrap();
        let loaded = store.get(&created.id).unwrap().expect("record exists");

        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.answers, created.answers);
        assert_eq!(loaded.segment_family, SegmentFamily::Assessment);
        assert!(loaded.classification.is_some());
        assert!(loaded.enrichment.is_empty());
    }

    #[test]
    fn get_unknown_id_returns_none() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let missing = store.get(&SubmissionId::from_string("nope")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn create_assigns_distinct_ids() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let a = store
            .create(
                sample_new(SegmentFamily::Pulse),
                Classification::empty(),
            )
            .unwrap();
        let b = store
            .create(
                sample_new(SegmentFamily::Pulse),
                Classification::empty(),
            )
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn put_overwrites_the_whole_document() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let new = sample_new(SegmentFamily::Assessment);
        let classification = sample_classification(&new);
        let mut record = store.create(new, classification).unwrap();

        record.set_slot("report", serde_json::json!({"headline": "h", "body": "b"}));
        store.put(&record).unwrap();

        let loaded = store.get(&record.id).unwrap().expect("record exists");
        assert!(loaded.slot("report").is_some());

        // last writer wins: a second put with the slot removed clears it
        record.enrichment.clear();
        store.put(&record).unwrap();
        let loaded = store.get(&record.id).unwrap().expect("record exists");
        assert!(loaded.slot("report").is_none());
    }

    #[test]
    fn list_recent_is_newest_first_and_limited() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let new = sample_new(SegmentFamily::Pulse);
            let classification = sample_classification(&new);
            ids.push(store.create(new, classification).unwrap().id);
        }

        let listed = store.list_recent(2).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);
        assert!(listed[0].ready);
    }

    #[test]
    fn open_on_disk_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intake.db");

        let id = {
            let store = SqliteRecordStore::open(&path).unwrap();
            let new = sample_new(SegmentFamily::Assessment);
            let classification = sample_classification(&new);
            store.create(new, classification).unwrap().id
        };

        let store = SqliteRecordStore::open(&path).unwrap();
        let loaded = store.get(&id).unwrap();
        assert!(loaded.is_some());
    }
}
