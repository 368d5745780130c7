//! Scripted collaborators (testing only)
//!
//! Provides `ScriptedSimulator`, `ScriptedVerifier`, `RecordingMutator` and
//! `ScriptedReasoner`. All of them append to a shared [`CallLog`] so tests
//! can assert the order in which the loop drives its collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborator::{
    Mutator, PatchKind, PatchRequest, Reasoner, ReasoningRequest, Simulator, Verifier,
};
use crate::config::RuntimeConfig;
use crate::domain::{
    AccuracyMetric, CollaboratorError, CollaboratorResult, EventId, FaultReport, GateStage,
    RevisionPlan, ScoringTarget,
};

// ---------------------------------------------------------------------------
// CallLog
// ---------------------------------------------------------------------------

/// One collaborator invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Simulate {
        sample_size: usize,
        first: Option<EventId>,
        last: Option<EventId>,
    },
    Check,
    Patch {
        kind: PatchKind,
        description: String,
    },
    Propose {
        stage: GateStage,
        memory: String,
    },
}

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    /// Sample sizes of every simulation, in order.
    pub fn simulations(&self) -> Vec<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Simulate { sample_size, .. } => Some(*sample_size),
                _ => None,
            })
            .collect()
    }

    pub fn checks(&self) -> usize {
        self.count(|c| matches!(c, Call::Check))
    }

    pub fn patches(&self) -> usize {
        self.count(|c| matches!(c, Call::Patch { .. }))
    }

    pub fn proposals(&self) -> usize {
        self.count(|c| matches!(c, Call::Propose { .. }))
    }
}

/// Fault counter shared by a verifier and a mutator: the verifier reports a
/// fault while it is positive, each patch decrements it.
#[derive(Debug, Clone, Default)]
pub struct FaultCounter(Arc<AtomicU32>);

impl FaultCounter {
    pub fn new(faults: u32) -> Self {
        Self(Arc::new(AtomicU32::new(faults)))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn decrement(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

// ---------------------------------------------------------------------------
// ScriptedSimulator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SimulatorScript {
    by_size: HashMap<usize, VecDeque<f64>>,
    fallback: VecDeque<f64>,
    transient_failures: u32,
    delay: Duration,
}

fn next_value(queue: &mut VecDeque<f64>) -> Option<f64> {
    // The last scripted value repeats forever.
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().copied()
    }
}

/// Simulator answering from per-sample-size scripts.
#[derive(Debug)]
pub struct ScriptedSimulator {
    log: CallLog,
    script: Mutex<SimulatorScript>,
}

impl ScriptedSimulator {
    /// Same accuracy for every sample.
    pub fn constant(log: CallLog, percent: f64) -> Self {
        Self::sequence(log, vec![percent])
    }

    /// Accuracies in call order regardless of sample size.
    pub fn sequence(log: CallLog, percents: Vec<f64>) -> Self {
        Self {
            log,
            script: Mutex::new(SimulatorScript {
                fallback: percents.into(),
                ..Default::default()
            }),
        }
    }

    /// Accuracies per sample size, each list consumed in order.
    pub fn by_sample_size(log: CallLog, scripts: Vec<(usize, Vec<f64>)>) -> Self {
        Self {
            log,
            script: Mutex::new(SimulatorScript {
                by_size: scripts
                    .into_iter()
                    .map(|(size, values)| (size, values.into()))
                    .collect(),
                ..Default::default()
            }),
        }
    }

    /// Take `delay` (tokio time) to answer each call.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().delay = delay;
        self
    }

    /// Fail transiently `n` times before answering.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.script.lock().unwrap().transient_failures = n;
        self
    }
}

#[async_trait]
impl Simulator for ScriptedSimulator {
    async fn simulate(&self, events: &[EventId]) -> CollaboratorResult<AccuracyMetric> {
        self.log.record(Call::Simulate {
            sample_size: events.len(),
            first: events.first().cloned(),
            last: events.last().cloned(),
        });

        let delay = self.script.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut guard = self.script.lock().unwrap();
        let script = &mut *guard;
        if script.transient_failures > 0 {
            script.transient_failures -= 1;
            return Err(CollaboratorError::Transient("simulator busy".to_string()));
        }
        let value = match script.by_size.get_mut(&events.len()) {
            Some(queue) => next_value(queue),
            None => next_value(&mut script.fallback),
        }
        .ok_or_else(|| {
            CollaboratorError::Rejected(format!("no scripted accuracy for {} events", events.len()))
        })?;
        AccuracyMetric::new(value).map_err(|e| CollaboratorError::Rejected(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ScriptedVerifier
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum VerifierScript {
    Queue(Mutex<VecDeque<String>>),
    Counter(FaultCounter),
    Always(String),
}

/// Verifier reporting scripted faults.
#[derive(Debug)]
pub struct ScriptedVerifier {
    log: CallLog,
    script: VerifierScript,
}

impl ScriptedVerifier {
    pub fn clean(log: CallLog) -> Self {
        Self::faulting(log, Vec::new())
    }

    /// Report each fault once, in order, then clean.
    pub fn faulting(log: CallLog, faults: Vec<&str>) -> Self {
        Self {
            log,
            script: VerifierScript::Queue(Mutex::new(
                faults.into_iter().map(str::to_string).collect(),
            )),
        }
    }

    /// Report a fault while `counter` is positive.
    pub fn counting(log: CallLog, counter: FaultCounter) -> Self {
        Self {
            log,
            script: VerifierScript::Counter(counter),
        }
    }

    pub fn always_faulty(log: CallLog, fault: &str) -> Self {
        Self {
            log,
            script: VerifierScript::Always(fault.to_string()),
        }
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn check(&self, _target: &ScoringTarget) -> CollaboratorResult<FaultReport> {
        self.log.record(Call::Check);
        let fault = match &self.script {
            VerifierScript::Queue(queue) => queue.lock().unwrap().pop_front(),
            VerifierScript::Counter(counter) => {
                let n = counter.get();
                (n > 0).then(|| format!("{n} fault(s) left"))
            }
            VerifierScript::Always(fault) => Some(fault.clone()),
        };
        Ok(fault.map_or_else(FaultReport::clean, FaultReport::fault))
    }
}

// ---------------------------------------------------------------------------
// RecordingMutator
// ---------------------------------------------------------------------------

/// Mutator that records patch requests and optionally fails on script.
#[derive(Debug)]
pub struct RecordingMutator {
    log: CallLog,
    counter: Option<FaultCounter>,
    failures: Mutex<VecDeque<CollaboratorError>>,
    delay: Duration,
}

impl RecordingMutator {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            counter: None,
            failures: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
        }
    }

    /// Each successful patch removes one fault from `counter`.
    pub fn reducing(log: CallLog, counter: FaultCounter) -> Self {
        Self {
            counter: Some(counter),
            ..Self::new(log)
        }
    }

    /// Return these errors on the next calls, in order.
    pub fn failing_with(self, errors: Vec<CollaboratorError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    /// Take `delay` (tokio time) to apply each patch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Mutator for RecordingMutator {
    async fn patch(
        &self,
        _target: &ScoringTarget,
        request: &PatchRequest,
        _runtime: &RuntimeConfig,
    ) -> CollaboratorResult<()> {
        self.log.record(Call::Patch {
            kind: request.kind,
            description: request.description.clone(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some(counter) = &self.counter {
            counter.decrement();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedReasoner
// ---------------------------------------------------------------------------

/// Reasoner returning scripted plans, then numbered placeholders.
#[derive(Debug)]
pub struct ScriptedReasoner {
    log: CallLog,
    plans: Mutex<VecDeque<String>>,
    issued: AtomicU32,
}

impl ScriptedReasoner {
    pub fn new(log: CallLog) -> Self {
        Self::with_plans(log, Vec::new())
    }

    pub fn with_plans(log: CallLog, plans: Vec<&str>) -> Self {
        Self {
            log,
            plans: Mutex::new(plans.into_iter().map(str::to_string).collect()),
            issued: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn propose(
        &self,
        request: &ReasoningRequest<'_>,
        _runtime: &RuntimeConfig,
    ) -> CollaboratorResult<RevisionPlan> {
        self.log.record(Call::Propose {
            stage: request.trigger.stage,
            memory: request.memory.to_string(),
        });
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let text = self
            .plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("revision {n}: reweight the odds factor"));
        Ok(RevisionPlan::new(text))
    }
}
