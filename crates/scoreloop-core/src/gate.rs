//! Accuracy gates and the per-cycle program.
//!
//! [`GateEvaluator`] measures one stage: it draws the corpus prefix for the
//! stage, asks the simulator for the success rate and compares it with the
//! threshold. [`GateController`] runs a whole cycle on top of it:
//!
//! 1. repair the artifact until the verifier reports it clean
//! 2. evaluate PRELIMINARY, then FINAL
//! 3. on the first failing gate, revise the algorithm and repair again
//!
//! A failing gate ends the cycle; the next cycle starts again from
//! PRELIMINARY.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::collaborator::Simulator;
use crate::config::GateConfig;
use crate::domain::{
    AccuracyMetric, EventId, GateStage, GateVerdict, HistoricalCorpus, Result, RevisionPlan,
    RevisionTrigger, ScoreloopError, ScoringTarget,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::repair::RepairEngine;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::revision::RevisionEngine;

/// Evaluates single gate stages against the corpus. No side effects besides
/// the simulator call.
pub struct GateEvaluator {
    corpus: Arc<HistoricalCorpus>,
    simulator: Arc<dyn Simulator>,
    gate: GateConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl GateEvaluator {
    pub fn new(
        corpus: Arc<HistoricalCorpus>,
        simulator: Arc<dyn Simulator>,
        gate: GateConfig,
    ) -> Self {
        Self {
            corpus,
            simulator,
            gate,
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

    pub fn corpus(&self) -> &HistoricalCorpus {
        &self.corpus
    }

    /// Configured sample size of `stage`.
    pub fn sample_size(&self, stage: GateStage) -> usize {
        match stage {
            GateStage::Preliminary => self.gate.preliminary_sample,
            GateStage::Final => self.gate.final_sample,
        }
    }

    /// Simulate the corpus prefix of `stage` and judge it.
    pub async fn evaluate(&self, stage: GateStage) -> Result<GateVerdict> {
        let wanted = self.sample_size(stage);
        let sample = self.corpus.prefix(wanted);
        if sample.len() < wanted {
            warn!(
                stage = %stage,
                wanted,
                available = sample.len(),
                "corpus is smaller than the stage sample; simulating the whole corpus"
            );
        }

        let accuracy = self.simulate(sample).await?;
        let verdict = GateVerdict {
            stage,
            sample_size: sample.len(),
            accuracy,
            threshold: self.gate.threshold_percent,
        };
        obs::emit_gate_evaluated(
            stage,
            verdict.sample_size,
            accuracy,
            verdict.threshold,
            verdict.passed(),
        );
        Ok(verdict)
    }

    /// Simulate an arbitrary list of events (single-event checks).
    pub async fn simulate(&self, events: &[EventId]) -> Result<AccuracyMetric> {
        let simulator = &self.simulator;
        let accuracy = call_with_retry("simulator", &self.retry, &self.cancel, || {
            simulator.simulate(events)
        })
        .await?;
        METRICS.inc_simulations();
        Ok(accuracy)
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// PRELIMINARY and FINAL both passed.
    Passed,
    /// A gate failed; a revision was applied and the artifact repaired.
    Revised,
    /// The artifact still faulted when the repair bound was reached.
    Unrepaired { last_fault: String },
}

/// Record of one `run_program` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub outcome: CycleOutcome,
    /// Verdicts in evaluation order; the last one decided the cycle.
    pub verdicts: Vec<GateVerdict>,
    pub revision: Option<RevisionPlan>,
    /// Patch requests sent during this cycle, pre-flight repair included.
    pub patches: u32,
}

impl CycleReport {
    fn new(cycle_id: &str) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            outcome: CycleOutcome::Revised,
            verdicts: Vec::new(),
            revision: None,
            patches: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == CycleOutcome::Passed
    }

    pub fn verdict(&self, stage: GateStage) -> Option<&GateVerdict> {
        self.verdicts.iter().rev().find(|v| v.stage == stage)
    }
}

/// Runs one gate cycle with remediation.
pub struct GateController {
    evaluator: GateEvaluator,
    repair: RepairEngine,
    revision: RevisionEngine,
    target: ScoringTarget,
}

impl GateController {
    pub fn new(
        evaluator: GateEvaluator,
        repair: RepairEngine,
        revision: RevisionEngine,
        target: ScoringTarget,
    ) -> Self {
        Self {
            evaluator,
            repair,
            revision,
            target,
        }
    }

    pub fn evaluator(&self) -> &GateEvaluator {
        &self.evaluator
    }

    pub fn target(&self) -> &ScoringTarget {
        &self.target
    }

    /// Judge one stage without remediation.
    pub async fn evaluate(&self, stage: GateStage) -> Result<GateVerdict> {
        self.evaluator.evaluate(stage).await
    }

    /// One full cycle: repair, PRELIMINARY, FINAL, remediation on failure.
    ///
    /// Only fatal errors are returned as `Err`; a repair that hits its bound
    /// ends the cycle with [`CycleOutcome::Unrepaired`].
    #[instrument(skip(self))]
    pub async fn run_program(&self, cycle_id: &str) -> Result<CycleReport> {
        let mut report = CycleReport::new(cycle_id);

        if !self.repair_into(&mut report).await? {
            return Ok(report);
        }

        for stage in [GateStage::Preliminary, GateStage::Final] {
            let verdict = self.evaluator.evaluate(stage).await?;
            let passed = verdict.passed();
            report.verdicts.push(verdict.clone());
            if passed {
                continue;
            }

            info!(stage = %stage, accuracy = %verdict.accuracy, "gate failed; revising");
            let trigger = RevisionTrigger {
                cycle_id: cycle_id.to_string(),
                stage,
                accuracy: verdict.accuracy,
            };
            let plan = self.revision.revise_algorithm(&self.target, &trigger).await?;
            report.revision = Some(plan);
            report.outcome = CycleOutcome::Revised;
            self.repair_into(&mut report).await?;
            return Ok(report);
        }

        report.outcome = CycleOutcome::Passed;
        Ok(report)
    }

    /// Run the repair engine, folding non-convergence into the report.
    /// Returns whether the artifact ended up clean.
    async fn repair_into(&self, report: &mut CycleReport) -> Result<bool> {
        match self.repair.repair_until_clean(&self.target).await {
            Ok(repair) => {
                report.patches += repair.patches;
                Ok(true)
            }
            Err(ScoreloopError::RepairDidNotConverge {
                iterations,
                last_fault,
            }) => {
                warn!(iterations, fault = %last_fault, "repair did not converge");
                report.patches += iterations;
                report.outcome = CycleOutcome::Unrepaired { last_fault };
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
