//! Revision plans and the context that triggered them.

use serde::{Deserialize, Serialize};

use crate::domain::gate::{AccuracyMetric, GateStage};

/// Free-form description of a change to the scoring algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionPlan(String);

impl RevisionPlan {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for RevisionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The gate failure a revision responds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionTrigger {
    pub cycle_id: String,
    pub stage: GateStage,
    pub accuracy: AccuracyMetric,
}

/// Whether the plan made it into the scoring artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    Failed { reason: String },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}
