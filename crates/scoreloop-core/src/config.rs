//! Configuration for a scoreloop run.
//!
//! Loaded from a TOML file; every section is optional and falls back to the
//! reference configuration. Relative paths resolve against the directory the
//! file was loaded from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Result, ScoreloopError, DEFAULT_FINAL_SAMPLE, DEFAULT_PRELIMINARY_SAMPLE,
    DEFAULT_THRESHOLD_PERCENT,
};
use crate::repair::RepairPolicy;
use crate::retry::RetryPolicy;

/// Default file name looked up when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "scoreloop.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Directory relative paths resolve against. Not serialized.
    #[serde(skip)]
    pub base_dir: PathBuf,
    pub corpus: CorpusConfig,
    pub gate: GateConfig,
    pub journal: JournalConfig,
    pub advisory: AdvisoryConfig,
    pub runtime: RuntimeConfig,
    pub repair: RepairPolicy,
    pub budget: LoopBudget,
    pub retry: RetryPolicy,
    pub collaborators: CollaboratorCommands,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub path: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pastRace.txt"),
        }
    }
}

/// Thresholds and sample sizes of the two gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Inclusive accuracy threshold, percent.
    pub threshold_percent: f64,
    pub preliminary_sample: usize,
    pub final_sample: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            preliminary_sample: DEFAULT_PRELIMINARY_SAMPLE,
            final_sample: DEFAULT_FINAL_SAMPLE,
        }
    }
}

/// Where revision plans are recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Append-only JSON-lines proposal history.
    pub proposal_log: PathBuf,
    /// Markdown rendering of the journal, rewritten after every append.
    pub agent_memory: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            proposal_log: PathBuf::from(".scoreloop/proposals.jsonl"),
            agent_memory: PathBuf::from(".scoreloop/agent-memory.md"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub documents: Vec<PathBuf>,
    pub guidance: Vec<String>,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            documents: vec![PathBuf::from("advice1.md"), PathBuf::from("advice2.md")],
            guidance: vec![
                "Review the numbers the scoring algorithm adds for each factor.".to_string(),
                "Make use of the shutuba CSV columns (e.g. shutuba_202403010511.csv) that the \
                 algorithm does not use yet."
                    .to_string(),
            ],
        }
    }
}

/// Settings handed to the mutation and reasoning collaborators on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Language tag the collaborators should answer in.
    pub locale: String,
    /// Standing instruction prepended to every mutation and revision request.
    pub autonomy_instruction: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            locale: "ja".to_string(),
            autonomy_instruction: "When making a fix, do not ask a human for confirmation; \
                                   decide on your own and apply the fix."
                .to_string(),
        }
    }
}

/// Upper bounds for the top-level loop. `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopBudget {
    pub max_cycles: Option<u32>,
    pub max_wall_clock_secs: Option<u64>,
}

impl Default for LoopBudget {
    fn default() -> Self {
        Self {
            max_cycles: Some(50),
            max_wall_clock_secs: None,
        }
    }
}

impl LoopBudget {
    pub fn unbounded() -> Self {
        Self {
            max_cycles: None,
            max_wall_clock_secs: None,
        }
    }

    pub fn max_wall_clock(&self) -> Option<Duration> {
        self.max_wall_clock_secs.map(Duration::from_secs)
    }
}

/// Argv of the external commands backing each collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorCommands {
    /// The scoring algorithm source the mutation collaborator edits.
    pub artifact: PathBuf,
    pub simulate: Vec<String>,
    pub verify: Vec<String>,
    pub patch: Vec<String>,
    pub propose: Vec<String>,
}

impl Default for CollaboratorCommands {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from("scorer.py"),
            simulate: vec!["python3".into(), "evaluate.py".into(), "--stdin".into()],
            verify: vec!["python3".into(), "main.py".into()],
            patch: vec!["gemini".into(), "--yolo".into()],
            propose: vec!["gemini".into()],
        }
    }
}

impl TuningConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ScoreloopError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml(&raw)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Parse and validate TOML text. `base_dir` is left empty.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ScoreloopError::InvalidConfig(format!("malformed TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML (used by `scoreloop init`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ScoreloopError::InvalidConfig(format!("cannot render TOML: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        let gate = &self.gate;
        if !(0.0..=100.0).contains(&gate.threshold_percent) {
            return Err(ScoreloopError::InvalidConfig(format!(
                "gate.threshold_percent must be within [0, 100], got {}",
                gate.threshold_percent
            )));
        }
        if gate.preliminary_sample == 0 || gate.final_sample == 0 {
            return Err(ScoreloopError::InvalidConfig(
                "gate sample sizes must be non-zero".to_string(),
            ));
        }
        if gate.preliminary_sample > gate.final_sample {
            return Err(ScoreloopError::InvalidConfig(format!(
                "gate.preliminary_sample ({}) must not exceed gate.final_sample ({})",
                gate.preliminary_sample, gate.final_sample
            )));
        }
        if self.repair.max_iterations == Some(0) {
            return Err(ScoreloopError::InvalidConfig(
                "repair.max_iterations must be at least 1 when set".to_string(),
            ));
        }
        if self.budget.max_cycles == Some(0) {
            return Err(ScoreloopError::InvalidConfig(
                "budget.max_cycles must be at least 1 when set".to_string(),
            ));
        }

        let commands = [
            ("simulate", &self.collaborators.simulate),
            ("verify", &self.collaborators.verify),
            ("patch", &self.collaborators.patch),
            ("propose", &self.collaborators.propose),
        ];
        for (name, argv) in commands {
            if argv.is_empty() {
                return Err(ScoreloopError::InvalidConfig(format!(
                    "collaborators.{name} command must not be empty"
                )));
            }
        }

        Ok(())
    }

    /// Resolve `path` against [`TuningConfig::base_dir`].
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}
