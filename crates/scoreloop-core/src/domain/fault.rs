//! Verifier outcomes and the scoring artifact they describe.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::event::EventId;

/// The scoring algorithm under revision.
///
/// `probe` is the event the self-check runs against (the oldest corpus entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringTarget {
    pub artifact: PathBuf,
    pub probe: EventId,
}

impl ScoringTarget {
    pub fn new(artifact: impl Into<PathBuf>, probe: EventId) -> Self {
        Self {
            artifact: artifact.into(),
            probe,
        }
    }
}

/// Result of one verifier run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub has_fault: bool,
    /// Empty when `has_fault` is false.
    pub fault_description: String,
}

impl FaultReport {
    pub fn clean() -> Self {
        Self {
            has_fault: false,
            fault_description: String::new(),
        }
    }

    pub fn fault(description: impl Into<String>) -> Self {
        Self {
            has_fault: true,
            fault_description: description.into(),
        }
    }

    /// The fault description, or `None` for a clean report.
    pub fn description(&self) -> Option<&str> {
        self.has_fault.then_some(self.fault_description.as_str())
    }
}
