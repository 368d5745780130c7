//! Revision engine.
//!
//! Asks the reasoner for a revision plan, has the mutator apply it, and
//! records the plan in the proposal journal. The journal entry is written
//! whether or not the apply step succeeded, so later revisions see every
//! attempt.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::collaborator::{Mutator, PatchRequest, Reasoner, ReasoningRequest};
use crate::config::RuntimeConfig;
use crate::domain::{
    AdvisoryMaterial, ApplyOutcome, CollaboratorError, Result, RevisionPlan, RevisionTrigger,
    ScoreloopError, ScoringTarget,
};
use crate::journal::ProposalJournal;
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{call_with_retry, RetryPolicy};

pub struct RevisionEngine {
    reasoner: Arc<dyn Reasoner>,
    mutator: Arc<dyn Mutator>,
    journal: ProposalJournal,
    advisory: AdvisoryMaterial,
    runtime: RuntimeConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RevisionEngine {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        mutator: Arc<dyn Mutator>,
        journal: ProposalJournal,
        advisory: AdvisoryMaterial,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            reasoner,
            mutator,
            journal,
            advisory,
            runtime,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn journal(&self) -> &ProposalJournal {
        &self.journal
    }

    /// Propose, apply and record one revision.
    ///
    /// A blank plan counts as a transient reasoner failure and is retried.
    /// If the mutator rejects the plan, the attempt is still journaled and
    /// the plan returned; if the mutator is unavailable the attempt is
    /// journaled and the error propagated.
    #[instrument(skip_all, fields(cycle_id = %trigger.cycle_id, stage = %trigger.stage))]
    pub async fn revise_algorithm(
        &self,
        target: &ScoringTarget,
        trigger: &RevisionTrigger,
    ) -> Result<RevisionPlan> {
        let memory = self.journal.memory().render()?;
        let request = ReasoningRequest {
            trigger,
            materials: &self.advisory,
            memory: &memory,
        };

        let reasoner = &self.reasoner;
        let runtime = &self.runtime;
        let plan = call_with_retry("reasoner", &self.retry, &self.cancel, move || async move {
            let plan = reasoner.propose(&request, runtime).await?;
            if plan.is_blank() {
                return Err(CollaboratorError::Transient(
                    "reasoner returned an empty revision plan".to_string(),
                ));
            }
            Ok(plan)
        })
        .await?;
        info!(plan = %plan, "revision proposed");

        let patch = PatchRequest::revision(&plan);
        let applied = call_with_retry("mutator", &self.retry, &self.cancel, || {
            self.mutator.patch(target, &patch, &self.runtime)
        })
        .await;

        let (outcome, escalate) = match applied {
            Ok(()) => (ApplyOutcome::Applied, None),
            Err(ScoreloopError::CollaboratorRejected { reason, .. }) => {
                warn!(reason = %reason, "revision plan could not be applied");
                (ApplyOutcome::Failed { reason }, None)
            }
            Err(e) => (
                ApplyOutcome::Failed {
                    reason: e.to_string(),
                },
                Some(e),
            ),
        };

        let entry = self.journal.append(trigger, &plan, outcome)?;
        METRICS.inc_revisions();
        obs::emit_revision_recorded(entry.seq, entry.short_digest(), entry.outcome.is_applied());

        match escalate {
            Some(e) => Err(e),
            None => Ok(plan),
        }
    }
}
