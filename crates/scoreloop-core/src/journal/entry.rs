//! Journal entry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{AccuracyMetric, ApplyOutcome, GateStage, RevisionPlan, RevisionTrigger};

/// SHA-256 hex digest of a plan's text.
pub fn plan_digest(plan: &RevisionPlan) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plan.text().as_bytes());
    hex::encode(hasher.finalize())
}

/// One recorded revision attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// 1-based position in the journal.
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub cycle_id: String,
    /// Gate whose failure triggered the revision.
    pub stage: GateStage,
    pub accuracy: AccuracyMetric,
    pub plan: RevisionPlan,
    pub outcome: ApplyOutcome,
    /// [`plan_digest`] of `plan`, checked on read.
    pub digest: String,
}

impl JournalEntry {
    pub(crate) fn new(
        seq: u64,
        trigger: &RevisionTrigger,
        plan: RevisionPlan,
        outcome: ApplyOutcome,
    ) -> Self {
        let digest = plan_digest(&plan);
        Self {
            seq,
            recorded_at: Utc::now(),
            cycle_id: trigger.cycle_id.clone(),
            stage: trigger.stage,
            accuracy: trigger.accuracy,
            plan,
            outcome,
            digest,
        }
    }

    /// Whether the stored digest still matches the plan text.
    pub fn digest_matches(&self) -> bool {
        plan_digest(&self.plan) == self.digest
    }

    /// Short digest form (first 12 hex chars).
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}
