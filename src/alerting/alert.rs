//! Fired Alerts

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rule::{AlertRule, AlertSeverity};

/// One firing of an [`AlertRule`].
///
/// Everything except the resolution fields is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_name: String,
    pub severity: AlertSeverity,
    pub message: String,
    /// Observed value that satisfied the rule
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    pub(crate) fn fire(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("metric".to_string(), serde_json::json!(rule.metric));
        metadata.insert("operator".to_string(), serde_json::json!(rule.operator));
        metadata.insert(
            "window_seconds".to_string(),
            serde_json::json!(rule.window_seconds),
        );

        Self {
            id: Uuid::new_v4().to_string(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            message: rule.render_message(value),
            value,
            threshold: rule.threshold,
            timestamp: now,
            resolved: false,
            resolved_at: None,
            metadata,
        }
    }

    pub(crate) fn mark_resolved(&mut self, resolved_by: &str, now: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(now);
        self.metadata
            .insert("resolved_by".to_string(), serde_json::json!(resolved_by));
    }

    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

/// Counters over the engine state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub active_alerts: usize,
    pub history_size: usize,
    pub active_by_severity: BTreeMap<AlertSeverity, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rule::Operator;

    #[test]
    fn test_fire_and_resolve() {
        let rule = AlertRule::new("high_cpu", "cpu_usage", Operator::Gt, 80.0, AlertSeverity::Warning)
            .with_description("High CPU usage detected");
        let now = Utc::now();

        let mut alert = Alert::fire(&rule, 93.456, now);
        assert_eq!(alert.rule_name, "high_cpu");
        assert_eq!(alert.message, "High CPU usage detected: cpu_usage is 93.46 (> 80)");
        assert_eq!(alert.metadata["operator"], "gt");
        assert!(alert.is_active());

        let later = now + chrono::Duration::minutes(5);
        alert.mark_resolved("oncall", later);
        assert!(!alert.is_active());
        assert_eq!(alert.resolved_at, Some(later));
        assert_eq!(alert.metadata["resolved_by"], "oncall");
    }

    #[test]
    fn test_ids_are_unique() {
        let rule = AlertRule::new("r", "cpu_usage", Operator::Gt, 1.0, AlertSeverity::Info);
        let a = Alert::fire(&rule, 2.0, Utc::now());
        let b = Alert::fire(&rule, 2.0, Utc::now());
        assert_ne!(a.id, b.id);
    }
}
