//! Performance Baselines
//!
//! A baseline pins a metric to a target value plus warning and critical
//! thresholds. Window averages are classified and scored against it:
//!
//! ```text
//!  score
//!   100 ┤━━━━━━━━━━┓
//!       │           ╲
//!       │            ╲   linear between target and critical
//!     0 ┤             ╲━━━━━━━━━━━━━━
//!       └──────┬───────┬─────────────▶ value
//!           target  critical
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// How badly a baseline is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Warning => write!(f, "warning"),
            ViolationSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Expected operating range of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub metric: String,
    /// Value at or below which the score is 100
    pub target: f64,
    pub warning_threshold: f64,
    /// Value at or above which the score is 0
    pub critical_threshold: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

impl PerformanceBaseline {
    pub fn new(
        metric: impl Into<String>,
        target: f64,
        warning_threshold: f64,
        critical_threshold: f64,
        unit: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            target,
            warning_threshold,
            critical_threshold,
            unit: unit.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.metric.trim().is_empty() {
            return Err(Error::InvalidBaseline("baseline has no metric".into()));
        }
        let values = [self.target, self.warning_threshold, self.critical_threshold];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidBaseline(format!(
                "baseline {} has non-finite values",
                self.metric
            )));
        }
        if self.target > self.warning_threshold {
            return Err(Error::InvalidBaseline(format!(
                "baseline {} target exceeds warning threshold",
                self.metric
            )));
        }
        if self.warning_threshold > self.critical_threshold {
            return Err(Error::InvalidBaseline(format!(
                "baseline {} warning threshold exceeds critical threshold",
                self.metric
            )));
        }
        Ok(())
    }

    /// `critical` at or above the critical threshold, `warning` at or above
    /// the warning threshold.
    pub fn classify(&self, value: f64) -> Option<ViolationSeverity> {
        if value >= self.critical_threshold {
            Some(ViolationSeverity::Critical)
        } else if value >= self.warning_threshold {
            Some(ViolationSeverity::Warning)
        } else {
            None
        }
    }

    /// Score in `[0, 100]`.
    pub fn score(&self, value: f64) -> f64 {
        if value <= self.target {
            return 100.0;
        }
        if value >= self.critical_threshold || self.critical_threshold <= self.target {
            return 0.0;
        }
        let span = self.critical_threshold - self.target;
        (100.0 * (1.0 - (value - self.target) / span)).clamp(0.0, 100.0)
    }
}

/// Baselines used when none are configured.
pub fn default_baselines() -> Vec<PerformanceBaseline> {
    vec![
        PerformanceBaseline::new(
            "api_response_time",
            200.0,
            500.0,
            1000.0,
            "ms",
            "API response time",
        ),
        PerformanceBaseline::new("cpu_usage", 50.0, 70.0, 90.0, "%", "CPU utilisation"),
        PerformanceBaseline::new("memory_usage", 512.0, 800.0, 1024.0, "MB", "Process memory"),
        PerformanceBaseline::new("disk_usage", 70.0, 85.0, 95.0, "%", "Disk utilisation"),
        PerformanceBaseline::new(
            "event_processing_time",
            50.0,
            100.0,
            250.0,
            "ms",
            "Event processing time",
        ),
    ]
}

/// Parse configured baseline entries, skipping malformed ones individually.
pub fn parse_baselines(entries: &[serde_yaml::Value]) -> Vec<PerformanceBaseline> {
    let mut baselines: Vec<PerformanceBaseline> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let baseline = match serde_yaml::from_value::<PerformanceBaseline>(entry.clone()) {
            Ok(b) => b,
            Err(e) => {
                warn!(index, "Skipping malformed performance baseline: {}", e);
                continue;
            }
        };
        if let Err(e) = baseline.validate() {
            warn!(index, "Skipping performance baseline: {}", e);
            continue;
        }
        match baselines.iter_mut().find(|b| b.metric == baseline.metric) {
            Some(existing) => *existing = baseline,
            None => baselines.push(baseline),
        }
    }

    baselines
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn api() -> PerformanceBaseline {
        PerformanceBaseline::new("api_response_time", 200.0, 500.0, 1000.0, "ms", "")
    }

    #[test]
    fn test_score_boundaries() {
        let b = api();
        assert_eq!(b.score(100.0), 100.0);
        assert_eq!(b.score(200.0), 100.0);
        assert_eq!(b.score(600.0), 50.0);
        assert_eq!(b.score(1000.0), 0.0);
        assert_eq!(b.score(5000.0), 0.0);
    }

    #[test]
    fn test_degenerate_baseline_scores() {
        let b = PerformanceBaseline::new("x", 100.0, 100.0, 100.0, "", "");
        assert_eq!(b.score(100.0), 100.0);
        assert_eq!(b.score(100.5), 0.0);
    }

    #[test]
    fn test_classify() {
        let b = api();
        assert_eq!(b.classify(499.0), None);
        assert_eq!(b.classify(500.0), Some(ViolationSeverity::Warning));
        assert_eq!(b.classify(999.9), Some(ViolationSeverity::Warning));
        assert_eq!(b.classify(1000.0), Some(ViolationSeverity::Critical));
    }

    #[test]
    fn test_validate() {
        assert!(api().validate().is_ok());
        let inverted = PerformanceBaseline::new("x", 1.0, 10.0, 5.0, "", "");
        assert_matches!(inverted.validate(), Err(Error::InvalidBaseline(_)));
        let nan = PerformanceBaseline::new("x", f64::NAN, 1.0, 2.0, "", "");
        assert_matches!(nan.validate(), Err(Error::InvalidBaseline(_)));
    }

    #[test]
    fn test_target_above_thresholds_rejected() {
        let b = PerformanceBaseline::new("cpu_usage", 95.0, 60.0, 80.0, "%", "");
        assert_matches!(b.validate(), Err(Error::InvalidBaseline(_)));

        let yaml = "- metric: cpu_usage\n  target: 95\n  warning_threshold: 60\n  critical_threshold: 80\n";
        let entries: Vec<serde_yaml::Value> = serde_yaml::from_str(yaml).unwrap();
        assert!(parse_baselines(&entries).is_empty());

        let flat = PerformanceBaseline::new("cpu_usage", 80.0, 80.0, 80.0, "%", "");
        assert!(flat.validate().is_ok());
    }

    #[test]
    fn test_parse_skips_bad_entries() {
        let yaml = r#"
- metric: api_response_time
  target: 100
  warning_threshold: 300
  critical_threshold: 600
  unit: ms
- metric: cpu_usage
  target: "high"
- metric: disk_usage
  target: 50
  warning_threshold: 90
  critical_threshold: 80
"#;
        let entries: Vec<serde_yaml::Value> = serde_yaml::from_str(yaml).unwrap();
        let baselines = parse_baselines(&entries);

        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0].metric, "api_response_time");
        assert_eq!(baselines[0].critical_threshold, 600.0);
    }

    #[test]
    fn test_defaults_valid() {
        assert!(default_baselines().iter().all(|b| b.validate().is_ok()));
    }
}
