//! Collaborators backed by external commands.
//!
//! Each collaborator runs a configured argv in the config directory. Inputs
//! go to the child's stdin; results come back on stdout and the exit code.
//! Children are killed when the call is dropped, so the retry timeout and
//! cancellation reach them too.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::collaborator::{Mutator, PatchRequest, Reasoner, ReasoningRequest, Simulator, Verifier};
use crate::config::{CollaboratorCommands, RuntimeConfig};
use crate::domain::{
    AccuracyMetric, CollaboratorError, CollaboratorResult, EventId, FaultReport, RevisionPlan,
    ScoringTarget,
};

pub const LOCALE_ENV: &str = "SCORELOOP_LOCALE";
pub const POLICY_ENV: &str = "SCORELOOP_POLICY";
pub const ARTIFACT_ENV: &str = "SCORELOOP_ARTIFACT";
pub const PROBE_ENV: &str = "SCORELOOP_PROBE";

/// Captured result of one command run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Trimmed stderr, falling back to stdout, then to the exit code.
    pub fn diagnostics(&self) -> String {
        [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("exited with code {}", self.exit_code))
    }
}

/// An argv plus the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<String>,
    working_dir: PathBuf,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            working_dir: working_dir.into(),
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Run with `extra_args` appended, feeding `stdin` to the child.
    pub async fn run(
        &self,
        extra_args: &[&str],
        stdin: Option<String>,
        env: &[(&str, String)],
    ) -> CollaboratorResult<CommandOutput> {
        let (exe, args) = self
            .argv
            .split_first()
            .ok_or_else(|| CollaboratorError::Rejected("empty command".to_string()))?;

        let start = Instant::now();
        let mut command = Command::new(exe);
        command
            .args(args)
            .args(extra_args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.working_dir.as_os_str().is_empty() {
            command.current_dir(&self.working_dir);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CollaboratorError::Rejected(format!("command not found: {exe}"))
            }
            _ => CollaboratorError::Transient(format!("failed to spawn {exe}: {e}")),
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // Feed stdin from a separate task so a child that writes before
            // reading cannot deadlock against us.
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!(error = %e, "child closed stdin early");
                }
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CollaboratorError::Transient(format!("failed to wait for {exe}: {e}")))?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            command = %exe,
            exit_code = result.exit_code,
            duration_ms = result.duration_ms,
            "collaborator command finished"
        );
        Ok(result)
    }
}

fn runtime_env(runtime: &RuntimeConfig) -> Vec<(&'static str, String)> {
    vec![
        (LOCALE_ENV, runtime.locale.clone()),
        (POLICY_ENV, runtime.autonomy_instruction.clone()),
    ]
}

fn target_env(target: &ScoringTarget) -> Vec<(&'static str, String)> {
    vec![
        (ARTIFACT_ENV, target.artifact.display().to_string()),
        (PROBE_ENV, target.probe.to_string()),
    ]
}

fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("valid percent pattern"))
}

/// Pull the success rate out of a simulator report: the last `NN.NN%`
/// anywhere in the output, otherwise the last line that is a bare number.
pub fn parse_accuracy(stdout: &str) -> Option<f64> {
    if let Some(caps) = percent_pattern().captures_iter(stdout).last() {
        return caps[1].parse().ok();
    }
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(|line| line.parse::<f64>().ok())
}

/// Simulator command: event ids on stdin (one per line), report on stdout.
pub struct CommandSimulator {
    spec: CommandSpec,
    env: Vec<(&'static str, String)>,
}

impl CommandSimulator {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            env: Vec::new(),
        }
    }

    /// Run the simulation against `target` with the same environment the
    /// verifier and mutator see.
    pub fn for_target(mut self, target: &ScoringTarget, runtime: &RuntimeConfig) -> Self {
        self.env = runtime_env(runtime);
        self.env.extend(target_env(target));
        self
    }
}

#[async_trait]
impl Simulator for CommandSimulator {
    async fn simulate(&self, events: &[EventId]) -> CollaboratorResult<AccuracyMetric> {
        let input = events
            .iter()
            .map(|e| format!("{e}\n"))
            .collect::<String>();
        let output = self.spec.run(&[], Some(input), &self.env).await?;
        if !output.success() {
            return Err(CollaboratorError::Transient(format!(
                "simulator failed: {}",
                output.diagnostics()
            )));
        }

        let percent = parse_accuracy(&output.stdout).ok_or_else(|| {
            CollaboratorError::Rejected("simulator output contains no accuracy figure".to_string())
        })?;
        AccuracyMetric::new(percent).map_err(|e| CollaboratorError::Rejected(e.to_string()))
    }
}

/// Verifier command: run against the probe event; exit 0 means clean.
pub struct CommandVerifier {
    spec: CommandSpec,
}

impl CommandVerifier {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    async fn check(&self, target: &ScoringTarget) -> CollaboratorResult<FaultReport> {
        let output = self
            .spec
            .run(&[target.probe.as_str()], None, &target_env(target))
            .await?;
        if output.success() {
            Ok(FaultReport::clean())
        } else {
            Ok(FaultReport::fault(output.diagnostics()))
        }
    }
}

/// Mutation command: patch prompt on stdin; a non-zero exit rejects the patch.
pub struct CommandMutator {
    spec: CommandSpec,
}

impl CommandMutator {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Mutator for CommandMutator {
    async fn patch(
        &self,
        target: &ScoringTarget,
        request: &PatchRequest,
        runtime: &RuntimeConfig,
    ) -> CollaboratorResult<()> {
        let mut env = runtime_env(runtime);
        env.extend(target_env(target));
        let prompt = request.render_prompt(target, runtime);
        let output = self.spec.run(&[], Some(prompt), &env).await?;
        if output.success() {
            Ok(())
        } else {
            Err(CollaboratorError::Rejected(output.diagnostics()))
        }
    }
}

/// Reasoning command: prompt on stdin, plan on stdout.
pub struct CommandReasoner {
    spec: CommandSpec,
}

impl CommandReasoner {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Reasoner for CommandReasoner {
    async fn propose(
        &self,
        request: &ReasoningRequest<'_>,
        runtime: &RuntimeConfig,
    ) -> CollaboratorResult<RevisionPlan> {
        let prompt = request.render_prompt(runtime);
        let output = self
            .spec
            .run(&[], Some(prompt), &runtime_env(runtime))
            .await?;
        if !output.success() {
            return Err(CollaboratorError::Transient(format!(
                "reasoner failed: {}",
                output.diagnostics()
            )));
        }
        Ok(RevisionPlan::new(output.stdout.trim()))
    }
}

/// The four command collaborators described by `commands`, run from `base_dir`.
pub struct CommandCollaborators {
    pub simulator: CommandSimulator,
    pub verifier: CommandVerifier,
    pub mutator: CommandMutator,
    pub reasoner: CommandReasoner,
}

impl CommandCollaborators {
    pub fn from_config(commands: &CollaboratorCommands, base_dir: &Path) -> Self {
        let spec = |argv: &Vec<String>| CommandSpec::new(argv.clone(), base_dir);
        Self {
            simulator: CommandSimulator::new(spec(&commands.simulate)),
            verifier: CommandVerifier::new(spec(&commands.verify)),
            mutator: CommandMutator::new(spec(&commands.patch)),
            reasoner: CommandReasoner::new(spec(&commands.propose)),
        }
    }
}
