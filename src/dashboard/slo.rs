//! Service Level Objectives & Error Budgets
//!
//! SLO compliance is derived from the in-window points of the bound metric;
//! the error budget is a step function of the SLO status.
//!
//! ```text
//! status    current >= target          → meeting
//!           current >= target * 0.95   → warning
//!           otherwise                  → breach
//!           no data                    → unknown
//!
//! budget    total     = window_days * 1440 * (1 - target / 100)
//!           consumed  = total * {breach 1.0, warning 0.7, meeting 0.1, unknown 0}
//!           remaining = total - consumed
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::MetricStore;

const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// Relative band below target still counted as warning
const WARNING_TOLERANCE: f64 = 0.95;

/// Budget share consumed per SLO status
const BREACH_CONSUMPTION: f64 = 1.0;
const WARNING_CONSUMPTION: f64 = 0.7;
const MEETING_CONSUMPTION: f64 = 0.1;

const BUDGET_WARNING_PERCENT: f64 = 80.0;
const BUDGET_EXHAUSTED_PERCENT: f64 = 100.0;

/// SLO compliance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SloStatus {
    Meeting,
    Warning,
    Breach,
    Unknown,
}

impl SloStatus {
    /// Pure function of the current value against the target.
    pub fn classify(current: Option<f64>, target_percentage: f64) -> Self {
        match current {
            None => SloStatus::Unknown,
            Some(v) if v >= target_percentage => SloStatus::Meeting,
            Some(v) if v >= target_percentage * WARNING_TOLERANCE => SloStatus::Warning,
            Some(_) => SloStatus::Breach,
        }
    }

    fn budget_consumption(&self) -> f64 {
        match self {
            SloStatus::Breach => BREACH_CONSUMPTION,
            SloStatus::Warning => WARNING_CONSUMPTION,
            SloStatus::Meeting => MEETING_CONSUMPTION,
            SloStatus::Unknown => 0.0,
        }
    }
}

impl std::fmt::Display for SloStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SloStatus::Meeting => write!(f, "meeting"),
            SloStatus::Warning => write!(f, "warning"),
            SloStatus::Breach => write!(f, "breach"),
            SloStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Predicate a point (or the window) has to satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SloObjective {
    /// Share of in-window points at or below `max_value`
    Threshold { max_value: f64 },
    /// `100 * (1 - Σerrors / Σtotal)` with the SLO metric as the total
    SuccessRatio { error_metric: String },
}

/// A service level objective bound to one metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloDefinition {
    pub name: String,
    pub description: String,
    pub metric: String,
    pub objective: SloObjective,
    pub target_percentage: f64,
    pub window_days: u32,
    /// Percentage satisfying the objective, recomputed on every read
    pub current_value: Option<f64>,
    pub status: SloStatus,
}

impl SloDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        metric: impl Into<String>,
        objective: SloObjective,
        target_percentage: f64,
        window_days: u32,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            metric: metric.into(),
            objective,
            target_percentage,
            window_days,
            current_value: None,
            status: SloStatus::Unknown,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_days) * 24 * 3600)
    }

    /// Percentage of the window satisfying the objective; `None` without data.
    pub fn measure(&self, store: &MetricStore, now: DateTime<Utc>) -> Option<f64> {
        let window = self.window();

        match &self.objective {
            SloObjective::Threshold { max_value } => {
                let points = store.query_recent_at(&self.metric, window, now);
                if points.is_empty() {
                    return None;
                }
                let good = points.iter().filter(|p| p.value <= *max_value).count();
                Some(good as f64 / points.len() as f64 * 100.0)
            }
            SloObjective::SuccessRatio { error_metric } => {
                let total = store.sum_at(&self.metric, window, now)?;
                if total <= 0.0 {
                    return None;
                }
                let errors = store.sum_at(error_metric, window, now).unwrap_or(0.0);
                Some((100.0 * (1.0 - errors / total)).clamp(0.0, 100.0))
            }
        }
    }

    /// Update `current_value` and `status` from the store.
    pub fn refresh(&mut self, store: &MetricStore, now: DateTime<Utc>) {
        self.current_value = self.measure(store, now);
        self.status = SloStatus::classify(self.current_value, self.target_percentage);
    }
}

/// Built-in SLO set.
pub fn default_slos() -> Vec<SloDefinition> {
    vec![
        SloDefinition::new(
            "api_availability",
            "Share of API requests served without error",
            "api_requests_total",
            SloObjective::SuccessRatio {
                error_metric: "api_errors_total".to_string(),
            },
            99.9,
            30,
        ),
        SloDefinition::new(
            "api_latency",
            "API responses within 1s",
            "api_response_time",
            SloObjective::Threshold { max_value: 1000.0 },
            95.0,
            7,
        ),
        SloDefinition::new(
            "event_processing",
            "Events processed within 500ms",
            "event_processing_time",
            SloObjective::Threshold { max_value: 500.0 },
            99.0,
            7,
        ),
        SloDefinition::new(
            "cpu_headroom",
            "CPU samples at or below 80%",
            "cpu_usage",
            SloObjective::Threshold { max_value: 80.0 },
            95.0,
            1,
        ),
    ]
}

/// Error budget state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Healthy,
    Warning,
    Exhausted,
}

/// Error budget of one SLO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBudget {
    pub slo_name: String,
    pub total_minutes: f64,
    pub consumed_minutes: f64,
    pub remaining_minutes: f64,
    pub percentage_consumed: f64,
    pub status: BudgetStatus,
}

impl ErrorBudget {
    /// Derive the budget from an SLO's current status.
    pub fn for_slo(slo: &SloDefinition) -> Self {
        let allowed = (1.0 - slo.target_percentage / 100.0).max(0.0);
        let total = f64::from(slo.window_days) * MINUTES_PER_DAY * allowed;
        let fraction = slo.status.budget_consumption();
        let consumed = total * fraction;
        let percentage_consumed = fraction * 100.0;

        let status = if percentage_consumed >= BUDGET_EXHAUSTED_PERCENT {
            BudgetStatus::Exhausted
        } else if percentage_consumed >= BUDGET_WARNING_PERCENT {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Healthy
        };

        Self {
            slo_name: slo.name.clone(),
            total_minutes: total,
            consumed_minutes: consumed,
            remaining_minutes: total - consumed,
            percentage_consumed,
            status,
        }
    }
}
