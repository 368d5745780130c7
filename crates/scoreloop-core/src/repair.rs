//! Verify-and-repair loop.
//!
//! A two-state machine: `Checking` runs the verifier; a clean report ends
//! the loop, a fault moves to `Repairing`, which asks the mutator to patch
//! the artifact and always returns to `Checking`. The number of patch
//! requests is bounded by [`RepairPolicy::max_iterations`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::collaborator::{Mutator, PatchRequest, Verifier};
use crate::config::RuntimeConfig;
use crate::domain::{Result, ScoreloopError, ScoringTarget};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{call_with_retry, RetryPolicy};

/// Bound on a single repair run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairPolicy {
    /// Maximum patch requests before giving up (`None` = unbounded).
    pub max_iterations: Option<u32>,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_iterations: Some(10),
        }
    }
}

impl RepairPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_iterations: None,
        }
    }

    pub fn bounded(max_iterations: u32) -> Self {
        Self {
            max_iterations: Some(max_iterations),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    Checking,
    Repairing,
}

/// What one repair run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Verifier invocations.
    pub checks: u32,
    /// Patch requests sent to the mutator.
    pub patches: u32,
    /// Fault descriptions, in the order they were patched.
    pub faults: Vec<String>,
}

impl RepairReport {
    /// True when the first check was already clean.
    pub fn was_clean(&self) -> bool {
        self.patches == 0
    }
}

/// Drives the verifier and mutator until the artifact checks clean.
pub struct RepairEngine {
    verifier: Arc<dyn Verifier>,
    mutator: Arc<dyn Mutator>,
    runtime: RuntimeConfig,
    policy: RepairPolicy,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RepairEngine {
    pub fn new(
        verifier: Arc<dyn Verifier>,
        mutator: Arc<dyn Mutator>,
        runtime: RuntimeConfig,
    ) -> Self {
        Self {
            verifier,
            mutator,
            runtime,
            policy: RepairPolicy::default(),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    /// Check, patch, re-check until the verifier reports no fault.
    ///
    /// A clean first check returns immediately without touching the mutator.
    /// A mutator rejection counts as a spent iteration and the loop carries
    /// on; hitting the iteration bound yields
    /// [`ScoreloopError::RepairDidNotConverge`].
    #[instrument(skip(self, target), fields(artifact = %target.artifact.display()))]
    pub async fn repair_until_clean(&self, target: &ScoringTarget) -> Result<RepairReport> {
        let mut report = RepairReport::default();
        let mut state = RepairState::Checking;
        let mut fault = String::new();

        loop {
            match state {
                RepairState::Checking => {
                    let outcome = call_with_retry("verifier", &self.retry, &self.cancel, || {
                        self.verifier.check(target)
                    })
                    .await?;
                    METRICS.inc_verifications();
                    report.checks += 1;

                    match outcome.description() {
                        None => {
                            obs::emit_repair_finished(report.patches);
                            return Ok(report);
                        }
                        Some(description) => {
                            fault = description.to_string();
                            state = RepairState::Repairing;
                        }
                    }
                }
                RepairState::Repairing => {
                    if let Some(max) = self.policy.max_iterations {
                        if report.patches >= max {
                            return Err(ScoreloopError::RepairDidNotConverge {
                                iterations: report.patches,
                                last_fault: fault,
                            });
                        }
                    }

                    report.patches += 1;
                    obs::emit_repair_iteration(report.patches, &fault);
                    let request = PatchRequest::repair(fault.clone());
                    let patched = call_with_retry("mutator", &self.retry, &self.cancel, || {
                        self.mutator.patch(target, &request, &self.runtime)
                    })
                    .await;
                    METRICS.inc_patches();
                    report.faults.push(fault.clone());

                    match patched {
                        Ok(()) => {}
                        Err(ScoreloopError::CollaboratorRejected { reason, .. }) => {
                            warn!(iteration = report.patches, reason = %reason, "patch rejected");
                        }
                        Err(e) => return Err(e),
                    }
                    state = RepairState::Checking;
                }
            }
        }
    }
}
