//! Domain-level error taxonomy for scoreloop.

use std::path::PathBuf;

/// Errors returned by a collaborator call (simulator, verifier, mutator, reasoner).
///
/// `Transient` and `Timeout` are retried with backoff by the retry layer;
/// `Rejected` means the collaborator understood the request and refused it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("rejected: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Transient(_) | CollaboratorError::Timeout { .. }
        )
    }
}

/// Result type for a single collaborator call.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// scoreloop domain errors.
#[derive(Debug, thiserror::Error)]
pub enum ScoreloopError {
    #[error("failed to load corpus from {path}: {reason}")]
    CorpusLoad { path: PathBuf, reason: String },

    #[error("failed to load advisory material {name}: {reason}")]
    AdvisoryLoad { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("repair did not converge after {iterations} patch(es); last fault: {last_fault}")]
    RepairDidNotConverge { iterations: u32, last_fault: String },

    #[error("{collaborator} unavailable after {attempts} attempt(s): {reason}")]
    CollaboratorUnavailable {
        collaborator: String,
        attempts: u32,
        reason: String,
    },

    #[error("{collaborator} rejected the request: {reason}")]
    CollaboratorRejected {
        collaborator: String,
        reason: String,
    },

    #[error("invalid accuracy metric {0}: expected a percentage in [0, 100]")]
    InvalidMetric(f64),

    #[error("loop budget exhausted after {cycles} cycle(s): {reason}")]
    BudgetExhausted { cycles: u32, reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error("journal error: {0}")]
    Journal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoreloopError {
    /// Whether this error must abort the whole process.
    ///
    /// Every variant is fatal except a repair that did not converge, which
    /// only ends the current cycle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ScoreloopError::RepairDidNotConverge { .. })
    }
}

/// Result type for scoreloop domain operations.
pub type Result<T> = std::result::Result<T, ScoreloopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_load_display() {
        let err = ScoreloopError::CorpusLoad {
            path: PathBuf::from("pastRace.txt"),
            reason: "no such file".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pastRace.txt"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_collaborator_error_retryable() {
        assert!(CollaboratorError::Transient("503".into()).is_retryable());
        assert!(CollaboratorError::Timeout { limit_ms: 10 }.is_retryable());
        assert!(!CollaboratorError::Rejected("bad input".into()).is_retryable());
    }

    #[test]
    fn test_non_convergence_is_not_fatal() {
        let err = ScoreloopError::RepairDidNotConverge {
            iterations: 3,
            last_fault: "KeyError: 'odds'".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("KeyError"));

        assert!(ScoreloopError::Cancelled.is_fatal());
        assert!(ScoreloopError::CollaboratorUnavailable {
            collaborator: "simulator".into(),
            attempts: 3,
            reason: "timed out".into(),
        }
        .is_fatal());
    }
}
