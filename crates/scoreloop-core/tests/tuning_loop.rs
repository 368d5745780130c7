use std::sync::Arc;
use std::time::Duration;

use scoreloop_core::fakes::{
    CallLog, RecordingMutator, ScriptedReasoner, ScriptedSimulator, ScriptedVerifier,
};
use scoreloop_core::{
    AdvisoryMaterial, EventId, GateConfig, GateController, GateEvaluator, GateStage,
    HistoricalCorpus, LoopBudget, Mutator, ProposalJournal, ReferenceDoc, RepairEngine,
    RepairPolicy, RetryPolicy, RevisionEngine, RuntimeConfig, ScoreloopError, ScoringTarget,
    TuningLoop,
};
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

fn journal(dir: &TempDir) -> ProposalJournal {
    ProposalJournal::open(
        dir.path().join("proposals.jsonl"),
        dir.path().join("agent-memory.md"),
    )
    .unwrap()
}

#[allow(clippy::too_many_arguments)]
fn tuning_loop(
    dir: &TempDir,
    log: &CallLog,
    simulator: ScriptedSimulator,
    verifier: ScriptedVerifier,
    mutator: RecordingMutator,
    repair_bound: u32,
    budget: LoopBudget,
    cancel: CancellationToken,
) -> TuningLoop {
    let corpus = Arc::new(HistoricalCorpus::new(
        (0..200).map(|i| EventId::new(format!("race-{i:03}"))).collect(),
    ));
    let target = ScoringTarget::new("scorer.py", EventId::new("race-000"));
    let mutator: Arc<dyn Mutator> = Arc::new(mutator);

    let evaluator = GateEvaluator::new(corpus, Arc::new(simulator), GateConfig::default())
        .with_retry(RetryPolicy::none())
        .with_cancellation(cancel.clone());
    let repair = RepairEngine::new(Arc::new(verifier), mutator.clone(), RuntimeConfig::default())
        .with_policy(RepairPolicy::bounded(repair_bound))
        .with_retry(RetryPolicy::none())
        .with_cancellation(cancel.clone());
    let revision = RevisionEngine::new(
        Arc::new(ScriptedReasoner::new(log.clone())),
        mutator,
        journal(dir),
        AdvisoryMaterial::new(vec![ReferenceDoc::Guidance {
            text: "Review the factor weights.".into(),
        }]),
        RuntimeConfig::default(),
    )
    .with_retry(RetryPolicy::none())
    .with_cancellation(cancel.clone());

    TuningLoop::new(GateController::new(evaluator, repair, revision, target), budget)
        .with_cancellation(cancel)
}

#[tokio::test]
async fn loop_runs_until_both_gates_pass() {
    let dir = tempdir().unwrap();
    let log = CallLog::new();
    let tuning = tuning_loop(
        &dir,
        &log,
        ScriptedSimulator::by_sample_size(
            log.clone(),
            vec![(80, vec![20.0, 25.0, 40.0]), (138, vec![33.0])],
        ),
        ScriptedVerifier::clean(log.clone()),
        RecordingMutator::new(log.clone()),
        5,
        LoopBudget::default(),
        CancellationToken::new(),
    );

    let report = tuning.run().await.unwrap();

    assert_eq!(report.cycles, 3);
    assert_eq!(report.revisions, 2);
    assert_eq!(report.patches, 0);
    assert_eq!(report.verdict(GateStage::Preliminary).unwrap().accuracy.percent(), 40.0);
    assert_eq!(report.verdict(GateStage::Final).unwrap().accuracy.percent(), 33.0);
    assert_eq!(journal(&dir).history().len().unwrap(), 2);
    assert!(report.confirmation().contains("final 33.00%"));
}

#[tokio::test]
async fn cycle_budget_is_enforced() {
    let dir = tempdir().unwrap();
    let log = CallLog::new();
    let tuning = tuning_loop(
        &dir,
        &log,
        ScriptedSimulator::constant(log.clone(), 12.0),
        ScriptedVerifier::clean(log.clone()),
        RecordingMutator::new(log.clone()),
        5,
        LoopBudget {
            max_cycles: Some(3),
            max_wall_clock_secs: None,
        },
        CancellationToken::new(),
    );

    let err = tuning.run().await.unwrap_err();

    assert!(matches!(err, ScoreloopError::BudgetExhausted { cycles: 3, .. }));
    assert_eq!(log.simulations(), vec![80, 80, 80]);
    assert_eq!(journal(&dir).history().len().unwrap(), 3);
}

#[tokio::test(start_paused = true)]
async fn wall_clock_budget_interrupts_a_slow_cycle() {
    let dir = tempdir().unwrap();
    let log = CallLog::new();
    let tuning = tuning_loop(
        &dir,
        &log,
        ScriptedSimulator::constant(log.clone(), 12.0).with_delay(Duration::from_secs(120)),
        ScriptedVerifier::clean(log.clone()),
        RecordingMutator::new(log.clone()),
        5,
        LoopBudget {
            max_cycles: None,
            max_wall_clock_secs: Some(60),
        },
        CancellationToken::new(),
    );

    let err = tuning.run().await.unwrap_err();

    assert!(matches!(err, ScoreloopError::BudgetExhausted { cycles: 1, .. }));
    assert!(journal(&dir).history().is_empty().unwrap());
}

#[tokio::test]
async fn unrepaired_cycle_is_retried_rather_than_fatal() {
    let dir = tempdir().unwrap();
    let log = CallLog::new();
    let tuning = tuning_loop(
        &dir,
        &log,
        ScriptedSimulator::constant(log.clone(), 35.0),
        ScriptedVerifier::faulting(log.clone(), vec!["first", "second", "third"]),
        RecordingMutator::new(log.clone()),
        1,
        LoopBudget::default(),
        CancellationToken::new(),
    );

    let report = tuning.run().await.unwrap();

    assert_eq!(report.cycles, 2);
    assert_eq!(report.revisions, 0);
    assert_eq!(report.patches, 2);
    assert_eq!(log.simulations(), vec![80, 138]);
}

#[tokio::test]
async fn cancelled_loop_stops_before_the_first_cycle() {
    let dir = tempdir().unwrap();
    let log = CallLog::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let tuning = tuning_loop(
        &dir,
        &log,
        ScriptedSimulator::constant(log.clone(), 35.0),
        ScriptedVerifier::clean(log.clone()),
        RecordingMutator::new(log.clone()),
        5,
        LoopBudget::unbounded(),
        cancel,
    );

    let err = tuning.run().await.unwrap_err();

    assert!(matches!(err, ScoreloopError::Cancelled));
    assert!(log.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn wall_clock_budget_still_journals_the_revision_in_flight() {
    let dir = tempdir().unwrap();
    let log = CallLog::new();
    let tuning = tuning_loop(
        &dir,
        &log,
        ScriptedSimulator::constant(log.clone(), 10.0),
        ScriptedVerifier::clean(log.clone()),
        RecordingMutator::new(log.clone()).with_delay(Duration::from_secs(120)),
        5,
        LoopBudget {
            max_cycles: None,
            max_wall_clock_secs: Some(60),
        },
        CancellationToken::new(),
    );

    let err = tuning.run().await.unwrap_err();

    assert!(matches!(err, ScoreloopError::BudgetExhausted { cycles: 1, .. }));
    assert_eq!(log.proposals(), 1);
    let entries = journal(&dir).history().entries().unwrap();
    assert_eq!(entries.len(), log.proposals());
    assert!(!entries[0].outcome.is_applied());
}
