//! Domain models for scoreloop.
//!
//! Canonical definitions for the core entities:
//! - `EventId` / `HistoricalCorpus`: ordered historical events
//! - `GateStage` / `AccuracyMetric` / `GateVerdict`: acceptance gates
//! - `FaultReport` / `ScoringTarget`: verifier outcomes
//! - `RevisionPlan`: proposed algorithm changes
//! - `AdvisoryMaterial`: static revision guidance

pub mod advisory;
pub mod error;
pub mod event;
pub mod fault;
pub mod gate;
pub mod revision;

pub use advisory::{AdvisoryMaterial, ReferenceDoc};
pub use error::{CollaboratorError, CollaboratorResult, Result, ScoreloopError};
pub use event::{EventId, HistoricalCorpus};
pub use fault::{FaultReport, ScoringTarget};
pub use gate::{
    AccuracyMetric, GateStage, GateVerdict, DEFAULT_FINAL_SAMPLE, DEFAULT_PRELIMINARY_SAMPLE,
    DEFAULT_THRESHOLD_PERCENT,
};
pub use revision::{ApplyOutcome, RevisionPlan, RevisionTrigger};
