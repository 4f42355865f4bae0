//! Health Status Types

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Service is healthy
    Healthy,
    /// Service is degraded but operational
    Degraded,
    /// Service is unhealthy
    Unhealthy,
    /// No check has produced a result yet
    Unknown,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Check if status is healthy
    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    /// Ordering used to pick the worst status: healthy < degraded < unhealthy.
    pub fn severity(&self) -> u8 {
        match self {
            HealthStatus::Unknown => 0,
            HealthStatus::Healthy => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    /// Worst status among `statuses`, `Unknown` when empty.
    pub fn worst(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
        statuses
            .into_iter()
            .max_by_key(|s| s.severity())
            .unwrap_or(HealthStatus::Unknown)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// What a check function returns: status, message and free-form details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub status: HealthStatus,
    pub message: String,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl CheckOutcome {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    /// Attach a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        self.details.insert(key.into(), value);
        self
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Check name
    pub name: String,
    /// Status
    pub status: HealthStatus,
    /// Message
    pub message: String,
    /// When the check finished
    pub timestamp: DateTime<Utc>,
    /// Duration of check
    pub duration_ms: u64,
    /// Check-specific details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, serde_json::Value>>,
}

impl HealthCheckResult {
    /// Build a result from a check outcome
    pub fn from_outcome(name: impl Into<String>, outcome: CheckOutcome, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: outcome.status,
            message: outcome.message,
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            details: if outcome.details.is_empty() {
                None
            } else {
                Some(outcome.details)
            },
        }
    }
}

/// Aggregate view over the latest result of every check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Worst status across checks
    pub overall_status: HealthStatus,
    pub total_checks: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    /// Most recent completion time
    pub last_checked: Option<DateTime<Utc>>,
    /// Latest result per check, in registration order
    pub checks: Vec<HealthCheckResult>,
}

impl HealthSummary {
    pub fn from_results(checks: Vec<HealthCheckResult>) -> Self {
        let count = |status: HealthStatus| checks.iter().filter(|c| c.status == status).count();

        Self {
            overall_status: HealthStatus::worst(checks.iter().map(|c| c.status)),
            total_checks: checks.len(),
            healthy: count(HealthStatus::Healthy),
            degraded: count(HealthStatus::Degraded),
            unhealthy: count(HealthStatus::Unhealthy),
            last_checked: checks.iter().map(|c| c.timestamp).max(),
            checks,
        }
    }
}
