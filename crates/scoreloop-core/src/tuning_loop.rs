//! Top-level loop: run gate cycles until the FINAL gate passes.

use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::LoopBudget;
use crate::domain::{GateStage, GateVerdict, Result, ScoreloopError};
use crate::gate::{CycleOutcome, CycleReport, GateController};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::ensure_active;

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopReport {
    pub cycles: u32,
    pub revisions: u32,
    pub patches: u32,
    /// Verdicts of the passing cycle.
    pub verdicts: Vec<GateVerdict>,
    pub duration_ms: u64,
}

impl LoopReport {
    pub fn verdict(&self, stage: GateStage) -> Option<&GateVerdict> {
        self.verdicts.iter().find(|v| v.stage == stage)
    }

    /// The one line printed when the loop finishes.
    pub fn confirmation(&self) -> String {
        let accuracies = self
            .verdicts
            .iter()
            .map(|v| format!("{} {}", v.stage, v.accuracy))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "all gates passed ({accuracies}) after {} cycle(s), {} revision(s), {} patch(es)",
            self.cycles, self.revisions, self.patches
        )
    }
}

#[derive(Default)]
struct Tally {
    cycles: u32,
    revisions: u32,
    patches: u32,
}

impl Tally {
    fn add(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.patches += report.patches;
        if report.revision.is_some() {
            self.revisions += 1;
        }
    }
}

pub struct TuningLoop {
    controller: GateController,
    budget: LoopBudget,
    cancel: CancellationToken,
}

impl TuningLoop {
    pub fn new(controller: GateController, budget: LoopBudget) -> Self {
        Self {
            controller,
            budget,
            cancel: CancellationToken::new(),
        }
    }

    /// Pass the same token the controller's engines were built with, so that
    /// cancelling also interrupts collaborator calls in flight. The loop
    /// fires this token itself when the wall-clock budget runs out.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn controller(&self) -> &GateController {
        &self.controller
    }

    /// Run cycles until one passes both gates.
    ///
    /// Fails with [`ScoreloopError::BudgetExhausted`] when the cycle or
    /// wall-clock budget runs out first, with [`ScoreloopError::Cancelled`]
    /// when cancelled, and with any fatal error raised inside a cycle.
    pub async fn run(&self) -> Result<LoopReport> {
        let started = Instant::now();
        let deadline = self
            .budget
            .max_wall_clock()
            .map(|limit| tokio::time::Instant::now() + limit);
        let mut tally = Tally::default();

        let outcome = self.run_cycles(deadline, &mut tally).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_loop_finished(tally.cycles, tally.revisions, duration_ms, outcome.is_ok());
        METRICS.flush();

        let passing = outcome?;
        Ok(LoopReport {
            cycles: tally.cycles,
            revisions: tally.revisions,
            patches: tally.patches,
            verdicts: passing.verdicts,
            duration_ms,
        })
    }

    async fn run_cycles(
        &self,
        deadline: Option<tokio::time::Instant>,
        tally: &mut Tally,
    ) -> Result<CycleReport> {
        loop {
            ensure_active(&self.cancel)?;
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return Err(wall_clock_exhausted(tally.cycles));
            }
            if let Some(max) = self.budget.max_cycles {
                if tally.cycles >= max {
                    return Err(ScoreloopError::BudgetExhausted {
                        cycles: tally.cycles,
                        reason: format!("cycle limit of {max} reached"),
                    });
                }
            }

            let cycle = tally.cycles + 1;
            let cycle_id = Uuid::new_v4().to_string();
            obs::emit_cycle_started(&cycle_id, cycle);
            METRICS.inc_cycles();

            let run = self
                .controller
                .run_program(&cycle_id)
                .instrument(obs::cycle_span(&cycle_id, cycle));
            let report = match deadline {
                Some(deadline) => self.run_until(deadline, cycle, run).await?,
                None => run.await?,
            };
            tally.add(&report);

            match &report.outcome {
                CycleOutcome::Passed => return Ok(report),
                CycleOutcome::Revised => info!(cycle, "cycle revised the algorithm; restarting"),
                CycleOutcome::Unrepaired { last_fault } => {
                    info!(cycle, fault = %last_fault, "cycle ended with an unrepaired artifact")
                }
            }
        }
    }

    /// Run one cycle against the wall-clock deadline.
    ///
    /// On expiry the cancellation token fires and the cycle is awaited until
    /// it winds down, so every collaborator sees `Cancelled` at its next
    /// boundary and a revision in flight is still journaled.
    async fn run_until<F>(
        &self,
        deadline: tokio::time::Instant,
        cycle: u32,
        run: F,
    ) -> Result<CycleReport>
    where
        F: Future<Output = Result<CycleReport>>,
    {
        tokio::pin!(run);
        tokio::select! {
            outcome = &mut run => return outcome,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        warn!(cycle, "wall-clock budget reached; cancelling the cycle");
        self.cancel.cancel();
        match run.await {
            Ok(report) if report.passed() => Ok(report),
            Ok(_) | Err(ScoreloopError::Cancelled) => Err(wall_clock_exhausted(cycle)),
            Err(e) => Err(e),
        }
    }
}

fn wall_clock_exhausted(cycles: u32) -> ScoreloopError {
    ScoreloopError::BudgetExhausted {
        cycles,
        reason: "wall-clock limit reached".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccuracyMetric;

    #[test]
    fn test_confirmation_line_lists_verdicts() {
        let report = LoopReport {
            cycles: 3,
            revisions: 2,
            patches: 1,
            verdicts: vec![
                GateVerdict {
                    stage: GateStage::Preliminary,
                    sample_size: 80,
                    accuracy: AccuracyMetric::new(35.0).unwrap(),
                    threshold: 30.0,
                },
                GateVerdict {
                    stage: GateStage::Final,
                    sample_size: 138,
                    accuracy: AccuracyMetric::new(32.5).unwrap(),
                    threshold: 30.0,
                },
            ],
            duration_ms: 10,
        };
        let line = report.confirmation();
        assert!(!line.contains('\n'));
        assert!(line.contains("preliminary 35.00%"));
        assert!(line.contains("final 32.50%"));
        assert!(line.contains("3 cycle(s)"));
        assert_eq!(report.verdict(GateStage::Final).unwrap().sample_size, 138);
    }
}
