//! Alert Rules
//!
//! Rule definitions and the JSON rule file they persist to:
//!
//! ```json
//! { "rules": [ { "name": "high_cpu_usage", "metric": "cpu_usage", ... } ] }
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::events::NotificationSeverity;
use crate::error::{Error, Result};
use crate::persist;

/// Comparison applied to the latest value and the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Ne,
}

impl Operator {
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Eq => (value - threshold).abs() < f64::EPSILON,
            Operator::Ne => (value - threshold).abs() >= f64::EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        }
    }

    /// Transport severity used when announcing an alert of this severity.
    pub fn notification_severity(&self) -> NotificationSeverity {
        match self {
            AlertSeverity::Info => NotificationSeverity::Low,
            AlertSeverity::Warning => NotificationSeverity::Normal,
            AlertSeverity::Error => NotificationSeverity::High,
            AlertSeverity::Critical => NotificationSeverity::Critical,
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_enabled() -> bool {
    true
}

fn default_window_seconds() -> u64 {
    300
}

fn default_cooldown_seconds() -> u64 {
    300
}

/// A threshold rule over one metric series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule name
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Series the rule reads
    pub metric: String,
    pub operator: Operator,
    pub threshold: f64,
    /// Only points this recent are considered
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    pub severity: AlertSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum time between two firings
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Last firing, updated by the engine
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

impl AlertRule {
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        operator: Operator,
        threshold: f64,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            metric: metric.into(),
            operator,
            threshold,
            window_seconds: default_window_seconds(),
            severity,
            enabled: true,
            cooldown_seconds: default_cooldown_seconds(),
            last_triggered: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_window_seconds(mut self, seconds: u64) -> Self {
        self.window_seconds = seconds;
        self
    }

    pub fn with_cooldown_seconds(mut self, seconds: u64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRule("rule name is empty".into()));
        }
        if self.metric.trim().is_empty() {
            return Err(Error::InvalidRule(format!("rule {} has no metric", self.name)));
        }
        if !self.threshold.is_finite() {
            return Err(Error::InvalidRule(format!(
                "rule {} has non-finite threshold",
                self.name
            )));
        }
        if self.window_seconds == 0 {
            return Err(Error::InvalidRule(format!(
                "rule {} has an empty evaluation window",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether `now` is still inside the cooldown of the last firing.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_triggered else {
            return false;
        };

        let cooldown = std::time::Duration::from_secs(self.cooldown_seconds);
        match chrono::Duration::from_std(cooldown)
            .ok()
            .and_then(|c| last.checked_add_signed(c))
        {
            Some(until) => now < until,
            // Cooldown beyond the representable range never elapses.
            None => true,
        }
    }

    /// Human-readable text for an alert fired at `value`.
    pub fn render_message(&self, value: f64) -> String {
        let subject = if self.description.is_empty() {
            self.name.as_str()
        } else {
            self.description.as_str()
        };
        format!(
            "{}: {} is {:.2} ({} {})",
            subject, self.metric, value, self.operator, self.threshold
        )
    }
}

/// Rule set installed when no rule file exists yet.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new("high_cpu_usage", "cpu_usage", Operator::Gt, 80.0, AlertSeverity::Warning)
            .with_description("High CPU usage detected"),
        AlertRule::new(
            "high_memory_usage",
            "memory_usage",
            Operator::Gt,
            1024.0,
            AlertSeverity::Warning,
        )
        .with_description("High memory usage detected"),
        AlertRule::new("disk_space_low", "disk_usage", Operator::Gt, 90.0, AlertSeverity::Critical)
            .with_description("Disk space running low")
            .with_cooldown_seconds(1800),
        AlertRule::new(
            "slow_api_response",
            "api_response_time",
            Operator::Gt,
            2000.0,
            AlertSeverity::Warning,
        )
        .with_description("API response time is slow")
        .with_window_seconds(180),
        AlertRule::new("api_errors", "api_errors_total", Operator::Gt, 10.0, AlertSeverity::Error)
            .with_description("High API error count")
            .with_window_seconds(600)
            .with_cooldown_seconds(600),
        AlertRule::new(
            "slow_event_processing",
            "event_processing_time",
            Operator::Gt,
            500.0,
            AlertSeverity::Warning,
        )
        .with_description("Event processing is slow")
        .with_window_seconds(180),
    ]
}

#[derive(Serialize)]
struct RuleFileRef<'a> {
    rules: &'a [AlertRule],
}

/// Parse a rule file document, skipping malformed or duplicate entries.
pub(crate) fn parse_rules(raw: &str) -> Result<Vec<AlertRule>> {
    let document: serde_json::Value = serde_json::from_str(raw)?;
    let entries = document
        .get("rules")
        .and_then(|r| r.as_array())
        .ok_or_else(|| Error::InvalidRule("rule file has no `rules` array".into()))?;

    let mut rules: Vec<AlertRule> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let rule = match serde_json::from_value::<AlertRule>(entry.clone()) {
            Ok(rule) => rule,
            Err(e) => {
                warn!(index, "Skipping malformed alert rule: {}", e);
                continue;
            }
        };

        if let Err(e) = rule.validate() {
            warn!(index, "Skipping alert rule: {}", e);
            continue;
        }
        if rules.iter().any(|r| r.name == rule.name) {
            warn!(rule = %rule.name, "Skipping duplicate alert rule");
            continue;
        }
        rules.push(rule);
    }

    Ok(rules)
}

/// Read and parse a rule file.
pub(crate) fn load_rules(path: &Path) -> Result<Vec<AlertRule>> {
    let raw = std::fs::read_to_string(path)?;
    let rules = parse_rules(&raw)?;
    debug!(path = %path.display(), rules = rules.len(), "Alert rules loaded");
    Ok(rules)
}

/// Copy an unreadable rule file aside before it can be rewritten.
pub(crate) fn back_up_rules(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup = path.with_file_name(format!("{}.bak", name));

    std::fs::copy(path, &backup).map_err(|e| Error::persistence(&backup, e))?;
    Ok(backup)
}

/// Rewrite the rule file in full.
pub(crate) fn save_rules(path: &Path, rules: &[AlertRule]) -> Result<()> {
    let body = serde_json::to_vec_pretty(&RuleFileRef { rules })
        .map_err(|e| Error::persistence(path, e))?;

    persist::replace_file(path, &body).map_err(|e| Error::persistence(path, e))?;

    debug!(path = %path.display(), rules = rules.len(), "Alert rules saved");
    Ok(())
}
