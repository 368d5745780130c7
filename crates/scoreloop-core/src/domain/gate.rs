//! Gate stages, accuracy metrics and the verdicts produced from them.

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, ScoreloopError};

/// Accuracy threshold (percent, inclusive) used by the reference configuration.
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 30.0;
/// Sample size of the preliminary gate in the reference configuration.
pub const DEFAULT_PRELIMINARY_SAMPLE: usize = 80;
/// Sample size of the final gate in the reference configuration.
pub const DEFAULT_FINAL_SAMPLE: usize = 138;

/// The two acceptance gates, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStage {
    Preliminary,
    Final,
}

impl GateStage {
    pub fn name(&self) -> &'static str {
        match self {
            GateStage::Preliminary => "preliminary",
            GateStage::Final => "final",
        }
    }
}

impl std::fmt::Display for GateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for GateStage {
    type Err = ScoreloopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preliminary" | "prelim" => Ok(GateStage::Preliminary),
            "final" => Ok(GateStage::Final),
            other => Err(ScoreloopError::InvalidConfig(format!(
                "unknown gate stage '{other}' (expected 'preliminary' or 'final')"
            ))),
        }
    }
}

/// Success rate reported by the simulator, as a percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccuracyMetric(f64);

impl AccuracyMetric {
    /// Validate and wrap a percentage.
    pub fn new(percent: f64) -> Result<Self> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(ScoreloopError::InvalidMetric(percent));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> f64 {
        self.0
    }

    /// Whether this metric clears `threshold` (inclusive).
    pub fn meets(&self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl std::fmt::Display for AccuracyMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}%", self.0)
    }
}

/// Outcome of evaluating one gate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub stage: GateStage,
    /// Number of events actually simulated.
    pub sample_size: usize,
    pub accuracy: AccuracyMetric,
    pub threshold: f64,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.accuracy.meets(self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_rejects_out_of_range() {
        assert!(AccuracyMetric::new(-0.1).is_err());
        assert!(AccuracyMetric::new(100.5).is_err());
        assert!(AccuracyMetric::new(f64::NAN).is_err());
        assert!(AccuracyMetric::new(0.0).is_ok());
        assert!(AccuracyMetric::new(100.0).is_ok());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let at = AccuracyMetric::new(30.0).unwrap();
        let below = AccuracyMetric::new(29.99).unwrap();
        assert!(at.meets(DEFAULT_THRESHOLD_PERCENT));
        assert!(!below.meets(DEFAULT_THRESHOLD_PERCENT));
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("final".parse::<GateStage>().unwrap(), GateStage::Final);
        assert_eq!(
            "Preliminary".parse::<GateStage>().unwrap(),
            GateStage::Preliminary
        );
        assert!("semi".parse::<GateStage>().is_err());
    }

    #[test]
    fn test_verdict_passed() {
        let v = GateVerdict {
            stage: GateStage::Final,
            sample_size: 138,
            accuracy: AccuracyMetric::new(32.0).unwrap(),
            threshold: DEFAULT_THRESHOLD_PERCENT,
        };
        assert!(v.passed());
        assert_eq!(v.accuracy.to_string(), "32.00%");
    }
}
