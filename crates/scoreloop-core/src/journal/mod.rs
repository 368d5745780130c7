//! Append-only proposal journal.
//!
//! Every revision plan is written exactly once, as one JSON line in the
//! proposal log. The proposal history and the agent memory are two read views
//! over that same log, so they cannot drift apart. After each append the
//! agent-memory view is also materialized to a markdown file for reasoning
//! tools that read their context from disk.

pub mod entry;
pub mod views;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::domain::{ApplyOutcome, Result, RevisionPlan, RevisionTrigger, ScoreloopError};

pub use entry::{plan_digest, JournalEntry};
pub use views::{AgentMemory, ProposalHistory};

/// Single writer for the proposal log.
#[derive(Debug, Clone)]
pub struct ProposalJournal {
    log_path: PathBuf,
    memory_path: PathBuf,
}

impl ProposalJournal {
    /// Open (or prepare) a journal. Parent directories are created; the log
    /// itself is created on first append.
    pub fn open(log_path: impl Into<PathBuf>, memory_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        let memory_path = memory_path.into();
        for path in [&log_path, &memory_path] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            log_path,
            memory_path,
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn memory_path(&self) -> &Path {
        &self.memory_path
    }

    /// Record one revision attempt and refresh the memory file.
    pub fn append(
        &self,
        trigger: &RevisionTrigger,
        plan: &RevisionPlan,
        outcome: ApplyOutcome,
    ) -> Result<JournalEntry> {
        self.seal_tail()?;
        let seq = self.entries()?.len() as u64 + 1;
        let entry = JournalEntry::new(seq, trigger, plan.clone(), outcome);

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(&line)?;
        file.sync_data()?;
        debug!(seq, digest = %entry.short_digest(), "journal entry appended");

        // The log is the source of truth; a stale memory file is rebuilt on
        // the next append.
        if let Err(e) = self.memory().materialize() {
            warn!(
                path = %self.memory_path.display(),
                error = %e,
                "failed to refresh agent memory file"
            );
        }

        Ok(entry)
    }

    /// Read every entry, oldest first. A missing log reads as empty.
    ///
    /// An unterminated final line that does not parse is what an interrupted
    /// append leaves behind; it is skipped with a warning. Malformed lines
    /// anywhere else are errors.
    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        let raw = match fs::read_to_string(&self.log_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let unterminated = !raw.is_empty() && !raw.ends_with('\n');
        let last = raw.lines().count().saturating_sub(1);

        let mut entries = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: JournalEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) if unterminated && lineno == last => {
                    warn!(
                        path = %self.log_path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping torn final journal line"
                    );
                    break;
                }
                Err(e) => {
                    return Err(ScoreloopError::Journal(format!(
                        "{}:{}: malformed entry: {e}",
                        self.log_path.display(),
                        lineno + 1
                    )));
                }
            };
            if !entry.digest_matches() {
                return Err(ScoreloopError::Journal(format!(
                    "{}:{}: digest mismatch for entry {}",
                    self.log_path.display(),
                    lineno + 1,
                    entry.seq
                )));
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn history(&self) -> ProposalHistory<'_> {
        ProposalHistory::new(self)
    }

    pub fn memory(&self) -> AgentMemory<'_> {
        AgentMemory::new(self)
    }

    /// Make sure the next append starts on a fresh line. A complete but
    /// unterminated entry gets its newline; a torn one is truncated away.
    fn seal_tail(&self) -> Result<()> {
        let raw = match fs::read(&self.log_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if raw.is_empty() || raw.ends_with(b"\n") {
            return Ok(());
        }

        let start = raw.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        let file = OpenOptions::new().append(true).open(&self.log_path)?;
        if serde_json::from_slice::<JournalEntry>(&raw[start..]).is_ok() {
            (&file).write_all(b"\n")?;
        } else {
            warn!(
                path = %self.log_path.display(),
                bytes = raw.len() - start,
                "truncating torn final journal line"
            );
            file.set_len(start as u64)?;
        }
        file.sync_data()?;
        Ok(())
    }

    /// Atomically replace the memory file: write to a temp file in the same
    /// directory, then rename.
    pub(crate) fn write_memory_file(&self, contents: &str) -> Result<()> {
        let dir = match self.memory_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(&self.memory_path).map_err(|e| e.error)?;
        Ok(())
    }
}
