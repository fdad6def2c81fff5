//! Submission record model: the central persisted entity

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::Classification;

/// Unique identifier for a submission.
///
/// Minted at creation as a base-36 millisecond timestamp plus an 8-char
/// random suffix. Collision-resistant under expected concurrency, not
/// collision-proof.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(String);

impl SubmissionId {
    /// Mint a fresh identifier from the clock plus random entropy
    pub fn mint() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let entropy = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", base36(millis), &entropy[..8]))
    }

    /// Wrap an existing identifier string (from storage or a caller)
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    buf.iter().rev().collect()
}

/// Questionnaire variant a submission came from. Selects the enrichment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentFamily {
    /// Long-form assessment questionnaire
    Assessment,
    /// Short-form pulse check
    Pulse,
}

impl SegmentFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentFamily::Assessment => "assessment",
            SegmentFamily::Pulse => "pulse",
        }
    }
}

impl std::str::FromStr for SegmentFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "assessment" => Ok(SegmentFamily::Assessment),
            "pulse" => Ok(SegmentFamily::Pulse),
            other => Err(format!("unknown segment family '{other}'")),
        }
    }
}

impl std::fmt::Display for SegmentFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single answered question, fixed at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Stable question identifier (e.g. "q2")
    pub question_id: String,
    /// Question text as shown to the respondent
    pub question_text: String,
    /// Categorical answer code ("A".."D" for scored questions)
    pub value: String,
    /// Human-readable label of the chosen option
    pub label: String,
    /// Free-text elaboration, when the question offered one
    pub additional_text: Option<String>,
}

impl Answer {
    pub fn new(
        question_id: impl Into<String>,
        question_text: impl Into<String>,
        value: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            question_text: question_text.into(),
            value: value.into(),
            label: label.into(),
            additional_text: None,
        }
    }

    pub fn with_additional_text(mut self, text: impl Into<String>) -> Self {
        self.additional_text = Some(text.into());
        self
    }
}

/// Input for creating a submission: everything except the assigned
/// identity and derived fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub segment_family: SegmentFamily,
    #[serde(default)]
    pub contact_details: BTreeMap<String, String>,
    pub answers: Vec<Answer>,
}

/// A persisted submission record, stored as one JSON document per id.
///
/// `answers` and `contact_details` never change after creation.
/// `classification` is derived and reproducible. `enrichment` maps a
/// slot name to the structured result of the task that owns the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub created_at: DateTime<Utc>,
    pub segment_family: SegmentFamily,
    pub contact_details: BTreeMap<String, String>,
    pub answers: Vec<Answer>,
    pub classification: Option<Classification>,
    pub enrichment: BTreeMap<String, serde_json::Value>,
}

impl Submission {
    /// Build a record from creation input, minting the id and timestamp
    pub fn from_new(new: NewSubmission, classification: Classification) -> Self {
        Self {
            id: SubmissionId::mint(),
            created_at: Utc::now(),
            segment_family: new.segment_family,
            contact_details: new.contact_details,
            answers: new.answers,
            classification: Some(classification),
            enrichment: BTreeMap::new(),
        }
    }

    /// Structured result for an enrichment slot, if populated
    pub fn slot(&self, name: &str) -> Option<&serde_json::Value> {
        self.enrichment.get(name)
    }

    /// Write a slot's result. Slots belong to exactly one task; callers
    /// only overwrite a slot when explicitly regenerating it.
    pub fn set_slot(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.enrichment.insert(name.into(), value);
    }

    /// Contact value by key, trimmed, if present and non-empty
    pub fn contact(&self, key: &str) -> Option<&str> {
        self.contact_details
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Compact listing row for recent submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub id: SubmissionId,
    pub created_at: DateTime<Utc>,
    pub segment_family: SegmentFamily,
    /// Dominant category code, when classified
    pub dominant: Option<String>,
    pub ready: bool,
}

impl SubmissionSummary {
    /// Build a listing row from a full record
    pub fn of(record: &Submission) -> Self {
        let classification = record.classification.as_ref();
        Self {
            id: record.id.clone(),
            created_at: record.created_at,
            segment_family: record.segment_family,
            dominant: classification
                .and_then(|c| c.dominant)
                .map(|c| c.to_string()),
            ready: classification.map(|c| c.is_ready()).unwrap_or(false),
        }
    }
}
