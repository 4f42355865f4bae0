//! Notifications
//!
//! Immutable records announced on the external publish/subscribe transport
//! whenever something noteworthy happens in the pipeline.
//!
//! # Example
//!
//! ```ignore
//! let notification = Notification::new(
//!     NotificationCategory::AlertTriggered,
//!     serde_json::json!({ "rule": "high_cpu_usage", "value": 93.0 }),
//!     NotificationSeverity::High,
//!     "alert_engine",
//! );
//!
//! notifier.publish(notification);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// A point was recorded on a metric series.
    MetricRecorded,
    /// A health check reported degraded or unhealthy.
    HealthCheckFailed,
    /// An alert rule fired.
    AlertTriggered,
    /// An alert was explicitly resolved.
    AlertResolved,
    /// A performance baseline was violated.
    PerformanceViolation,
}

impl NotificationCategory {
    /// Stable string form used as the transport topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::MetricRecorded => "metric_recorded",
            NotificationCategory::HealthCheckFailed => "health_check_failed",
            NotificationCategory::AlertTriggered => "alert_triggered",
            NotificationCategory::AlertResolved => "alert_resolved",
            NotificationCategory::PerformanceViolation => "performance_violation",
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSeverity {
    Low,
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for NotificationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationSeverity::Low => write!(f, "low"),
            NotificationSeverity::Normal => write!(f, "normal"),
            NotificationSeverity::High => write!(f, "high"),
            NotificationSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A single message for the notification transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub category: NotificationCategory,
    pub payload: serde_json::Value,
    pub severity: NotificationSeverity,
    /// Component that produced the notification
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        category: NotificationCategory,
        payload: serde_json::Value,
        severity: NotificationSeverity,
        source: impl Into<String>,
    ) -> Self {
        Self {
            category,
            payload,
            severity,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}
