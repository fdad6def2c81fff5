//! Enrichment tasks
//!
//! Each task turns record content into a generation request, sends it
//! through a `GenerativeClient`, and parses the untrusted response text
//! into the structured value for its enrichment slot. Tasks never touch
//! the store; reading and writing records is the orchestrator's job.
//!
//! The catalog is static: `report`, `action_plan`, `summary`. Which of
//! them run for a given submission is decided by the orchestrator's
//! plan selection.

mod action_plan;
mod parse;
mod report;
mod summary;
mod traits;

pub use action_plan::{ActionItem, ActionPlan, ActionPlanTask};
pub use report::{ReportContent, ReportTask};
pub use summary::{AccountSummary, SummaryTask};
pub use traits::{EnrichmentTask, FailurePolicy, TaskError};

use std::sync::Arc;

use crate::generate::GenerativeClient;

/// Slot names owned by the standard tasks
pub const REPORT_SLOT: &str = "report";
pub const ACTION_PLAN_SLOT: &str = "action_plan";
pub const SUMMARY_SLOT: &str = "summary";

/// The full set of known enrichment tasks, keyed by slot name.
pub struct TaskCatalog {
    tasks: Vec<Arc<dyn EnrichmentTask>>,
}

impl TaskCatalog {
    /// Build the standard catalog against one generative client.
    pub fn standard(client: Arc<dyn GenerativeClient>) -> Self {
        Self {
            tasks: vec![
                Arc::new(ReportTask::new(client.clone())),
                Arc::new(ActionPlanTask::new(client.clone())),
                Arc::new(SummaryTask::new(client)),
            ],
        }
    }

    /// Look up a task by the slot it owns.
    pub fn get(&self, slot: &str) -> Option<Arc<dyn EnrichmentTask>> {
        self.tasks.iter().find(|t| t.slot() == slot).cloned()
    }

    pub fn slots(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.slot()).collect()
    }
}
