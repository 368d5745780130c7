//! Collaborator traits.
//!
//! The loop never simulates, verifies, edits or reasons by itself; it drives
//! these four services. Command-backed implementations live in
//! [`crate::command`], scripted ones for tests in [`crate::fakes`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;
use crate::domain::{
    AccuracyMetric, AdvisoryMaterial, CollaboratorResult, EventId, FaultReport, ReferenceDoc,
    RevisionPlan, RevisionTrigger, ScoringTarget,
};

/// Runs the scoring algorithm over past events and reports its success rate.
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, events: &[EventId]) -> CollaboratorResult<AccuracyMetric>;
}

/// Runs the scoring algorithm's self-check.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn check(&self, target: &ScoringTarget) -> CollaboratorResult<FaultReport>;
}

/// Edits the scoring artifact in place.
#[async_trait]
pub trait Mutator: Send + Sync {
    async fn patch(
        &self,
        target: &ScoringTarget,
        request: &PatchRequest,
        runtime: &RuntimeConfig,
    ) -> CollaboratorResult<()>;
}

/// Reads advisory material and prior revisions, proposes the next revision.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn propose(
        &self,
        request: &ReasoningRequest<'_>,
        runtime: &RuntimeConfig,
    ) -> CollaboratorResult<RevisionPlan>;
}

/// Why the mutator is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    /// Fix a fault reported by the verifier.
    Repair,
    /// Apply a revision plan.
    Revision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRequest {
    pub kind: PatchKind,
    pub description: String,
}

impl PatchRequest {
    pub fn repair(fault: impl Into<String>) -> Self {
        Self {
            kind: PatchKind::Repair,
            description: fault.into(),
        }
    }

    pub fn revision(plan: &RevisionPlan) -> Self {
        Self {
            kind: PatchKind::Revision,
            description: plan.text().to_string(),
        }
    }

    /// Prompt text for a text-driven mutator.
    pub fn render_prompt(&self, target: &ScoringTarget, runtime: &RuntimeConfig) -> String {
        let task = match self.kind {
            PatchKind::Repair => format!(
                "Running {} against {} failed with the error below. Fix the defect.",
                target.artifact.display(),
                target.probe
            ),
            PatchKind::Revision => format!(
                "Apply the following revision to the scoring algorithm in {}.",
                target.artifact.display()
            ),
        };
        format!(
            "{}\nRespond in locale: {}\n\n{}\n\n{}\n",
            runtime.autonomy_instruction, runtime.locale, task, self.description
        )
    }
}

/// Everything the reasoner sees when proposing a revision.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub trigger: &'a RevisionTrigger,
    pub materials: &'a AdvisoryMaterial,
    /// Rendered agent memory (every prior revision, oldest first).
    pub memory: &'a str,
}

impl ReasoningRequest<'_> {
    /// Prompt text for a text-driven reasoner.
    pub fn render_prompt(&self, runtime: &RuntimeConfig) -> String {
        let mut prompt = format!(
            "{}\nRespond in locale: {}\n\n\
             The scoring algorithm reached {} on the {} gate, below the required threshold.\n\
             Review the evaluation algorithm using the reference material below and describe \
             the revision to make.\n",
            runtime.autonomy_instruction,
            runtime.locale,
            self.trigger.accuracy,
            self.trigger.stage
        );

        for doc in self.materials.docs() {
            match doc {
                ReferenceDoc::Document { name, content } => {
                    prompt.push_str(&format!("\n## Reference: {name}\n\n{content}\n"));
                }
                ReferenceDoc::Guidance { text } => {
                    prompt.push_str(&format!("\n## Guidance\n\n{text}\n"));
                }
            }
        }

        if !self.memory.trim().is_empty() {
            prompt.push_str("\n## Previous revisions\n\n");
            prompt.push_str(self.memory);
            prompt.push('\n');
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GateStage;

    fn trigger() -> RevisionTrigger {
        RevisionTrigger {
            cycle_id: "c1".to_string(),
            stage: GateStage::Preliminary,
            accuracy: AccuracyMetric::new(21.25).unwrap(),
        }
    }

    #[test]
    fn test_reasoning_prompt_contains_material_and_memory() {
        let materials = AdvisoryMaterial::new(vec![
            ReferenceDoc::Document {
                name: "advice1.md".into(),
                content: "favour inside draws".into(),
            },
            ReferenceDoc::Guidance {
                text: "use unused columns".into(),
            },
        ]);
        let trigger = trigger();
        let request = ReasoningRequest {
            trigger: &trigger,
            materials: &materials,
            memory: "## Revision 1\n\nraise jockey weight",
        };

        let prompt = request.render_prompt(&RuntimeConfig::default());
        assert!(prompt.contains("21.25%"));
        assert!(prompt.contains("preliminary"));
        assert!(prompt.contains("favour inside draws"));
        assert!(prompt.contains("use unused columns"));
        assert!(prompt.contains("raise jockey weight"));
        assert!(prompt.contains("Respond in locale: ja"));
    }

    #[test]
    fn test_reasoning_prompt_omits_empty_memory() {
        let materials = AdvisoryMaterial::new(vec![ReferenceDoc::Guidance {
            text: "g".into(),
        }]);
        let trigger = trigger();
        let request = ReasoningRequest {
            trigger: &trigger,
            materials: &materials,
            memory: "  ",
        };
        assert!(!request
            .render_prompt(&RuntimeConfig::default())
            .contains("Previous revisions"));
    }

    #[test]
    fn test_patch_prompt_mentions_probe_for_repairs() {
        let target = ScoringTarget::new("scorer.py", EventId::new("race-1"));
        let prompt = PatchRequest::repair("KeyError: 'odds'")
            .render_prompt(&target, &RuntimeConfig::default());
        assert!(prompt.contains("scorer.py"));
        assert!(prompt.contains("race-1"));
        assert!(prompt.contains("KeyError"));
    }
}
