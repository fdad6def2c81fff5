//! Classification engine: answers plus contact metadata in, segment
//! classification out.
//!
//! Pure and deterministic. No store, no network, no clock: the same
//! inputs always produce the same classification, so the result can be
//! recomputed at any time and compared against the persisted copy.

pub mod rules;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::submission::Answer;

/// Categorical answer alphabet for scored questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    A,
    B,
    C,
    D,
}

impl Category {
    /// Parse an answer code, ignoring case and surrounding whitespace.
    /// Codes outside the alphabet return None and are not scored.
    pub fn parse_code(code: &str) -> Option<Self> {
        match code.trim() {
            "A" | "a" => Some(Category::A),
            "B" | "b" => Some(Category::B),
            "C" | "c" => Some(Category::C),
            "D" | "d" => Some(Category::D),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::A => "A",
            Category::B => "B",
            Category::C => "C",
            Category::D => "D",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a submission qualifies for respondent-facing enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Readiness {
    Ready,
    NotReady,
}

/// Derived classification of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Category with the highest answer count, ties broken by
    /// [`rules::PRECEDENCE`]. None when no answer carried a scored code.
    pub dominant: Option<Category>,
    /// Percentage of scored answers per category, unrounded. Always
    /// contains every category; all zeros when nothing was scored.
    pub distribution: BTreeMap<Category, f64>,
    pub status: Readiness,
    /// Identifiers of the disqualifying conditions that held, exactly
    pub flags: BTreeSet<String>,
}

impl Classification {
    /// Classification of a submission with no scored answers and no flags
    pub fn empty() -> Self {
        Self {
            dominant: None,
            distribution: rules::PRECEDENCE.iter().map(|c| (*c, 0.0)).collect(),
            status: Readiness::Ready,
            flags: BTreeSet::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == Readiness::Ready
    }
}

/// Classify a submission from its answers and contact metadata.
pub fn classify(answers: &[Answer], contact: &BTreeMap<String, String>) -> Classification {
    let mut counts: BTreeMap<Category, usize> = BTreeMap::new();
    let mut total = 0usize;
    for answer in answers {
        if let Some(category) = Category::parse_code(&answer.value) {
            *counts.entry(category).or_insert(0) += 1;
            total += 1;
        }
    }

    let mut distribution = BTreeMap::new();
    for category in rules::PRECEDENCE {
        let count = counts.get(&category).copied().unwrap_or(0);
        let share = if total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / total as f64
        };
        distribution.insert(category, share);
    }

    // Strictly-greater replaces, so an earlier category keeps a tie.
    let mut dominant = None;
    let mut best = 0usize;
    for category in rules::PRECEDENCE {
        let count = counts.get(&category).copied().unwrap_or(0);
        if count > best {
            best = count;
            dominant = Some(category);
        }
    }

    let mut flags = BTreeSet::new();
    for rule in rules::DISQUALIFIERS {
        let held = answers.iter().any(|a| {
            a.question_id == rule.question_id && a.value.trim().eq_ignore_ascii_case(rule.value)
        });
        if held {
            flags.insert(rule.flag.to_string());
        }
    }
    let category_other = contact
        .get(rules::CONTACT_CATEGORY_KEY)
        .map(|v| v.trim().eq_ignore_ascii_case(rules::CONTACT_CATEGORY_OTHER))
        .unwrap_or(false);
    if category_other {
        flags.insert(rules::FLAG_CATEGORY_OTHER.to_string());
    }

    let status = if flags.is_empty() {
        Readiness::Ready
    } else {
        Readiness::NotReady
    };

    Classification {
        dominant,
        distribution,
        status,
        flags,
    }
}
