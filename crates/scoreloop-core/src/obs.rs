//! Structured observability hooks for the tuning loop.
//!
//! This module provides:
//! - Cycle-scoped tracing spans via [`cycle_span`]
//! - Emission functions for key loop events: cycle start, gate evaluation,
//!   repair iterations, recorded revisions, collaborator retries, loop end
//!
//! Events are emitted at `info!` level (retries at `warn!`). Filtering
//! follows `RUST_LOG`; set `SCORELOOP_LOG_FORMAT=json` for JSON lines.

use std::time::Duration;

use tracing::{info, info_span, warn, Span};

use crate::domain::{AccuracyMetric, GateStage};

/// Span carrying `cycle_id` and `cycle` for everything logged in one cycle.
///
/// Cycles suspend at collaborator calls, so attach it with
/// `tracing::Instrument` rather than entering it:
///
/// ```ignore
/// controller.run_program(&id).instrument(obs::cycle_span(&id, 3)).await
/// ```
pub fn cycle_span(cycle_id: &str, cycle: u32) -> Span {
    info_span!("scoreloop.cycle", cycle_id = %cycle_id, cycle = cycle)
}

pub fn emit_cycle_started(cycle_id: &str, cycle: u32) {
    info!(event = "cycle.started", cycle_id = %cycle_id, cycle = cycle);
}

/// Emit event: gate evaluated with sample size, accuracy and verdict.
pub fn emit_gate_evaluated(
    stage: GateStage,
    sample_size: usize,
    accuracy: AccuracyMetric,
    threshold: f64,
    passed: bool,
) {
    info!(
        event = "gate.evaluated",
        stage = %stage,
        sample_size = sample_size,
        accuracy = accuracy.percent(),
        threshold = threshold,
        passed = passed,
    );
}

/// Emit event: the verifier found a fault and a patch is about to be requested.
pub fn emit_repair_iteration(iteration: u32, fault: &str) {
    info!(event = "repair.iteration", iteration = iteration, fault = %fault);
}

pub fn emit_repair_finished(patches: u32) {
    info!(event = "repair.finished", patches = patches);
}

/// Emit event: a revision plan was journaled.
pub fn emit_revision_recorded(seq: u64, digest: &str, applied: bool) {
    info!(
        event = "revision.recorded",
        seq = seq,
        digest = %digest,
        applied = applied,
    );
}

/// Emit event: a collaborator call failed transiently and will be retried.
pub fn emit_collaborator_retry(
    collaborator: &str,
    attempt: u32,
    delay: Duration,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "collaborator.retry",
        collaborator = %collaborator,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Emit event: loop finished.
pub fn emit_loop_finished(cycles: u32, revisions: u32, duration_ms: u64, success: bool) {
    info!(
        event = "loop.finished",
        cycles = cycles,
        revisions = revisions,
        duration_ms = duration_ms,
        success = success,
    );
}
