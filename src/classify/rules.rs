//! Static scoring rules: category precedence and disqualifying conditions

use super::Category;

/// Tie-break order for the dominant category. When two categories hold
/// the same answer count, the one listed earlier wins.
pub const PRECEDENCE: [Category; 4] = [Category::A, Category::B, Category::C, Category::D];

/// An answer combination that marks a submission as not ready for
/// respondent-facing enrichment
#[derive(Debug, Clone, Copy)]
pub struct Disqualifier {
    /// Question the condition inspects
    pub question_id: &'static str,
    /// Answer code that triggers it (compared case-insensitively)
    pub value: &'static str,
    /// Stable flag identifier recorded on the classification
    pub flag: &'static str,
}

pub const DISQUALIFIERS: &[Disqualifier] = &[
    Disqualifier {
        question_id: "q2",
        value: "D",
        flag: "no-decision-authority",
    },
    Disqualifier {
        question_id: "q9",
        value: "D",
        flag: "no-active-need",
    },
];

/// Contact metadata key checked by the category rule
pub const CONTACT_CATEGORY_KEY: &str = "category";
/// Reserved contact category value that disqualifies on its own
pub const CONTACT_CATEGORY_OTHER: &str = "other";
/// Flag recorded when the contact category rule triggers
pub const FLAG_CATEGORY_OTHER: &str = "category-other";
