//! scoreloop core library
//!
//! Gates a scoring algorithm on historical accuracy and keeps revising and
//! repairing it until it passes. Re-exports the pieces needed to assemble a
//! loop programmatically.

pub mod collaborator;
pub mod command;
pub mod config;
pub mod corpus;
pub mod domain;
pub mod fakes;
pub mod gate;
pub mod journal;
pub mod metrics;
pub mod obs;
pub mod repair;
pub mod retry;
pub mod revision;
pub mod telemetry;
pub mod tuning_loop;

pub use collaborator::{
    Mutator, PatchKind, PatchRequest, Reasoner, ReasoningRequest, Simulator, Verifier,
};

pub use command::{
    CommandCollaborators, CommandMutator, CommandReasoner, CommandSimulator, CommandSpec,
    CommandVerifier,
};

pub use config::{
    AdvisoryConfig, CollaboratorCommands, CorpusConfig, GateConfig, JournalConfig, LoopBudget,
    RuntimeConfig, TuningConfig, DEFAULT_CONFIG_FILE,
};

pub use corpus::{load_corpus, parse_corpus};

pub use domain::{
    AccuracyMetric, AdvisoryMaterial, ApplyOutcome, CollaboratorError, CollaboratorResult,
    EventId, FaultReport, GateStage, GateVerdict, HistoricalCorpus, ReferenceDoc, Result,
    RevisionPlan, RevisionTrigger, ScoreloopError, ScoringTarget,
};

pub use gate::{CycleOutcome, CycleReport, GateController, GateEvaluator};
pub use journal::{AgentMemory, JournalEntry, ProposalHistory, ProposalJournal};
pub use repair::{RepairEngine, RepairPolicy, RepairReport};
pub use retry::RetryPolicy;
pub use revision::RevisionEngine;
pub use tuning_loop::{LoopReport, TuningLoop};

/// Crate version, for `--version` output and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
