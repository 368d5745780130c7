//! Read views over the proposal journal.

use crate::domain::{ApplyOutcome, Result, RevisionPlan};
use crate::journal::{JournalEntry, ProposalJournal};

/// Chronological record of every revision plan ever produced.
#[derive(Debug, Clone, Copy)]
pub struct ProposalHistory<'a> {
    journal: &'a ProposalJournal,
}

impl<'a> ProposalHistory<'a> {
    pub(crate) fn new(journal: &'a ProposalJournal) -> Self {
        Self { journal }
    }

    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        self.journal.entries()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn plans(&self) -> Result<Vec<RevisionPlan>> {
        Ok(self.entries()?.into_iter().map(|e| e.plan).collect())
    }

    pub fn latest(&self) -> Result<Option<JournalEntry>> {
        Ok(self.entries()?.pop())
    }
}

/// Prior revisions rendered as reasoning context.
#[derive(Debug, Clone, Copy)]
pub struct AgentMemory<'a> {
    journal: &'a ProposalJournal,
}

impl<'a> AgentMemory<'a> {
    pub(crate) fn new(journal: &'a ProposalJournal) -> Self {
        Self { journal }
    }

    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        self.journal.entries()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Markdown document with one section per revision, oldest first.
    pub fn render(&self) -> Result<String> {
        Ok(render_memory(&self.entries()?))
    }

    /// Write [`AgentMemory::render`] to the memory file.
    pub fn materialize(&self) -> Result<()> {
        let rendered = self.render()?;
        self.journal.write_memory_file(&rendered)
    }
}

/// Render entries as the agent-memory markdown document.
pub fn render_memory(entries: &[JournalEntry]) -> String {
    let mut out = String::from("# Revision memory\n");
    if entries.is_empty() {
        out.push_str("\nNo revisions recorded yet.\n");
        return out;
    }

    for entry in entries {
        let status = match &entry.outcome {
            ApplyOutcome::Applied => "applied".to_string(),
            ApplyOutcome::Failed { reason } => format!("apply failed: {reason}"),
        };
        out.push_str(&format!(
            "\n## Revision {} ({})\n\n- stage: {} at {}\n- status: {}\n\n{}\n",
            entry.seq,
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S UTC"),
            entry.stage,
            entry.accuracy,
            status,
            entry.plan.text().trim_end()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccuracyMetric, GateStage, RevisionTrigger};
    use tempfile::tempdir;

    #[test]
    fn test_render_empty_memory() {
        let rendered = render_memory(&[]);
        assert!(rendered.starts_with("# Revision memory"));
        assert!(rendered.contains("No revisions recorded yet."));
    }

    #[test]
    fn test_views_share_entries_and_memory_file_follows() {
        let dir = tempdir().unwrap();
        let memory_path = dir.path().join("agent-memory.md");
        let journal =
            ProposalJournal::open(dir.path().join("proposals.jsonl"), &memory_path).unwrap();
        let trigger = RevisionTrigger {
            cycle_id: "c9".into(),
            stage: GateStage::Final,
            accuracy: AccuracyMetric::new(29.0).unwrap(),
        };

        journal
            .append(
                &trigger,
                &RevisionPlan::new("add weather column"),
                ApplyOutcome::Failed {
                    reason: "mutator rejected".into(),
                },
            )
            .unwrap();

        assert_eq!(journal.history().len().unwrap(), 1);
        assert_eq!(journal.memory().len().unwrap(), 1);
        assert_eq!(
            journal.history().latest().unwrap().unwrap().plan.text(),
            "add weather column"
        );

        let on_disk = std::fs::read_to_string(&memory_path).unwrap();
        assert_eq!(on_disk, journal.memory().render().unwrap());
        assert!(on_disk.contains("## Revision 1"));
        assert!(on_disk.contains("apply failed: mutator rejected"));
        assert!(on_disk.contains("stage: final at 29.00%"));
    }
}
