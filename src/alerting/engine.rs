//! Alert Engine
//!
//! Evaluates threshold rules against the metric store on the host's cadence.
//!
//! # Rule State Machine
//!
//! ```text
//!   ┌───────────────┐  condition met &&   ┌───────────┐
//!   │ not triggered │ ──cooldown elapsed─▶ │ triggered │ ── creates Alert,
//!   └───────────────┘                      └───────────┘    last_triggered = now
//!           ▲                                    │
//!           └──────────── cooldown elapses ──────┘
//! ```
//!
//! Alerts stay active until explicitly resolved; recovery of the metric does
//! not resolve them.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::alert::{Alert, AlertStats};
use super::rule::{self, default_rules, AlertRule};
use crate::adapters::Notifier;
use crate::config::AlertingConfig;
use crate::domain::events::{NotificationCategory, NotificationSeverity};
use crate::domain::ports::NotificationChannel;
use crate::error::{Error, Result};
use crate::metrics::MetricStore;

/// Default bound on retained alert history
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

#[derive(Debug, Default)]
struct EngineState {
    /// Evaluation order is insertion order
    rules: Vec<AlertRule>,
    active: Vec<Alert>,
    history: VecDeque<Alert>,
}

/// Threshold rule evaluator with cooldown and explicit resolution.
pub struct AlertEngine {
    store: Arc<MetricStore>,
    state: Mutex<EngineState>,
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
    notifier: Notifier,
    rules_path: Option<PathBuf>,
    /// Cleared when an unreadable rule file could not be backed up
    rules_writable: bool,
    history_limit: usize,
}

impl AlertEngine {
    /// Engine with the given rules and no rule file.
    pub fn with_rules(store: Arc<MetricStore>, rules: Vec<AlertRule>, notifier: Notifier) -> Self {
        Self {
            store,
            state: Mutex::new(EngineState {
                rules,
                ..Default::default()
            }),
            channels: RwLock::new(Vec::new()),
            notifier,
            rules_path: None,
            rules_writable: true,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Engine with the built-in rule set and no rule file.
    pub fn new(store: Arc<MetricStore>, notifier: Notifier) -> Self {
        Self::with_rules(store, default_rules(), notifier)
    }

    /// Engine backed by the configured rule file.
    ///
    /// A missing file is created with the built-in rules. An unreadable or
    /// malformed file is copied to `<file>.bak` and the built-in rules are
    /// used in memory. If that copy fails the file is never overwritten.
    pub fn load(store: Arc<MetricStore>, config: &AlertingConfig, notifier: Notifier) -> Self {
        let path = config.rules_path.clone();
        let mut writable = true;

        let rules = if path.exists() {
            match rule::load_rules(&path) {
                Ok(rules) => {
                    info!(path = %path.display(), rules = rules.len(), "Loaded alert rules");
                    rules
                }
                Err(e) => {
                    error!(path = %path.display(), "Failed to load alert rules, using defaults: {}", e);
                    match rule::back_up_rules(&path) {
                        Ok(backup) => {
                            warn!(backup = %backup.display(), "Unreadable alert rule file backed up")
                        }
                        Err(e) => {
                            error!(path = %path.display(), "Failed to back up alert rules, file will not be rewritten: {}", e);
                            writable = false;
                        }
                    }
                    default_rules()
                }
            }
        } else {
            let rules = default_rules();
            if let Err(e) = rule::save_rules(&path, &rules) {
                warn!("Failed to write default alert rules: {}", e);
            } else {
                info!(path = %path.display(), "Created default alert rules");
            }
            rules
        };

        let mut engine = Self::with_rules(store, rules, notifier);
        engine.rules_path = Some(path);
        engine.rules_writable = writable;
        engine.history_limit = config.history_limit.max(1);
        engine
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn with_channel(self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.add_channel(channel);
        self
    }

    pub fn add_channel(&self, channel: Arc<dyn NotificationChannel>) {
        debug!(channel = channel.name(), "Notification channel added");
        self.channels.write().push(channel);
    }

    pub fn rules_path(&self) -> Option<&Path> {
        self.rules_path.as_deref()
    }

    // =========================================================================
    // Rule management
    // =========================================================================

    /// Add or replace a rule by name, then rewrite the rule file.
    ///
    /// An invalid rule is rejected without changes. A persistence failure is
    /// returned but the in-memory change stays applied. `last_triggered` is
    /// owned by the engine: a replaced rule keeps its cooldown and a new rule
    /// starts untriggered.
    pub fn add_rule(&self, mut rule: AlertRule) -> Result<()> {
        rule.validate()?;

        {
            let mut state = self.state.lock();
            match state.rules.iter_mut().find(|r| r.name == rule.name) {
                Some(existing) => {
                    rule.last_triggered = existing.last_triggered;
                    *existing = rule.clone();
                }
                None => {
                    rule.last_triggered = None;
                    state.rules.push(rule.clone());
                }
            }
        }
        info!(rule = %rule.name, metric = %rule.metric, "Alert rule added");

        self.save_rules()
    }

    /// Remove a rule by name, then rewrite the rule file.
    pub fn remove_rule(&self, name: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            let before = state.rules.len();
            state.rules.retain(|r| r.name != name);
            if state.rules.len() == before {
                return Err(Error::RuleNotFound(name.to_string()));
            }
        }
        info!(rule = %name, "Alert rule removed");

        self.save_rules()
    }

    /// Enable or disable a rule without removing it.
    pub fn set_rule_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        {
            let mut state = self.state.lock();
            let rule = state
                .rules
                .iter_mut()
                .find(|r| r.name == name)
                .ok_or_else(|| Error::RuleNotFound(name.to_string()))?;
            rule.enabled = enabled;
        }

        self.save_rules()
    }

    /// Rewrite the rule file from the in-memory rule set. No-op without a
    /// rule file.
    pub fn save_rules(&self) -> Result<()> {
        let Some(path) = &self.rules_path else {
            return Ok(());
        };
        if !self.rules_writable {
            let e = Error::persistence(path, "rule file failed to load and has no backup");
            error!("Refusing to save alert rules: {}", e);
            return Err(e);
        }

        let rules = self.rules();
        rule::save_rules(path, &rules).map_err(|e| {
            error!("Failed to save alert rules: {}", e);
            e
        })
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.state.lock().rules.clone()
    }

    pub fn rule(&self, name: &str) -> Option<AlertRule> {
        self.state.lock().rules.iter().find(|r| r.name == name).cloned()
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Evaluate every rule against the current time.
    pub async fn evaluate(&self) -> Vec<Alert> {
        self.evaluate_at(Utc::now()).await
    }

    /// Evaluate every enabled rule in order and return the alerts fired.
    ///
    /// Rules with no data inside their window are skipped. Channel delivery
    /// happens after the engine state is updated.
    #[instrument(skip(self))]
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let fired = self.fire_rules(now);

        for alert in &fired {
            self.notifier.notify(
                NotificationCategory::AlertTriggered,
                serde_json::to_value(alert).unwrap_or_default(),
                alert.severity.notification_severity(),
                "alert_engine",
            );
            self.dispatch(alert).await;
        }

        fired
    }

    fn fire_rules(&self, now: DateTime<Utc>) -> Vec<Alert> {
        let mut fired = Vec::new();
        let mut state = self.state.lock();
        let EngineState {
            rules,
            active,
            history,
        } = &mut *state;

        for rule in rules.iter_mut().filter(|r| r.enabled) {
            let window = Duration::from_secs(rule.window_seconds);
            let points = self.store.query_recent_at(&rule.metric, window, now);
            let Some(latest) = points.iter().max_by_key(|p| p.timestamp) else {
                continue;
            };

            if !rule.operator.evaluate(latest.value, rule.threshold) {
                continue;
            }
            if rule.in_cooldown(now) {
                debug!(rule = %rule.name, "Alert suppressed by cooldown");
                continue;
            }

            let alert = Alert::fire(rule, latest.value, now);
            rule.last_triggered = Some(now);

            warn!(
                rule = %rule.name,
                severity = %alert.severity,
                value = latest.value,
                threshold = rule.threshold,
                "Alert triggered: {}",
                alert.message
            );

            active.push(alert.clone());
            history.push_back(alert.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
            fired.push(alert);
        }

        fired
    }

    /// Deliver to every channel concurrently; failures are logged per channel.
    async fn dispatch(&self, alert: &Alert) {
        let channels: Vec<Arc<dyn NotificationChannel>> = self.channels.read().clone();
        if channels.is_empty() {
            return;
        }

        let deliveries = channels.iter().map(|channel| async move {
            let outcome = AssertUnwindSafe(channel.send(alert)).catch_unwind().await;
            (channel.name(), outcome)
        });

        for (name, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(Ok(())) => debug!(channel = name, alert = %alert.id, "Alert delivered"),
                Ok(Err(e)) => error!(channel = name, alert = %alert.id, "Alert delivery failed: {}", e),
                Err(_) => error!(channel = name, alert = %alert.id, "Notification channel panicked"),
            }
        }
    }

    // =========================================================================
    // Resolution & queries
    // =========================================================================

    pub fn resolve(&self, alert_id: &str, resolved_by: &str) -> bool {
        self.resolve_at(alert_id, resolved_by, Utc::now())
    }

    /// Resolve an active alert. Returns `false` when no active alert has this
    /// id, including when it was already resolved.
    pub fn resolve_at(&self, alert_id: &str, resolved_by: &str, now: DateTime<Utc>) -> bool {
        let resolved = {
            let mut state = self.state.lock();
            let Some(index) = state.active.iter().position(|a| a.id == alert_id) else {
                return false;
            };

            let mut alert = state.active.remove(index);
            alert.mark_resolved(resolved_by, now);
            if let Some(entry) = state.history.iter_mut().find(|a| a.id == alert_id) {
                *entry = alert.clone();
            }
            alert
        };

        info!(alert = %alert_id, rule = %resolved.rule_name, resolved_by, "Alert resolved");
        self.notifier.notify(
            NotificationCategory::AlertResolved,
            serde_json::to_value(&resolved).unwrap_or_default(),
            NotificationSeverity::Low,
            "alert_engine",
        );
        true
    }

    /// Unresolved alerts, oldest first.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.state.lock().active.clone()
    }

    pub fn history(&self, hours: u64) -> Vec<Alert> {
        self.history_at(hours, Utc::now())
    }

    /// Alerts fired in `[now - hours, ..]`, oldest first.
    pub fn history_at(&self, hours: u64, now: DateTime<Utc>) -> Vec<Alert> {
        let cutoff = crate::metrics::window_start(now, Duration::from_secs(hours.saturating_mul(3600)));

        self.state
            .lock()
            .history
            .iter()
            .filter(|a| cutoff.map_or(true, |c| a.timestamp >= c))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> AlertStats {
        let state = self.state.lock();
        let mut stats = AlertStats {
            total_rules: state.rules.len(),
            enabled_rules: state.rules.iter().filter(|r| r.enabled).count(),
            active_alerts: state.active.len(),
            history_size: state.history.len(),
            ..Default::default()
        };
        for alert in &state.active {
            *stats.active_by_severity.entry(alert.severity).or_default() += 1;
        }
        stats
    }
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("rules_path", &self.rules_path)
            .field("history_limit", &self.history_limit)
            .field("channels", &self.channels.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rule::{AlertSeverity, Operator};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cpu_rule() -> AlertRule {
        AlertRule::new("high_cpu", "cpu_usage", Operator::Gt, 80.0, AlertSeverity::Warning)
            .with_window_seconds(300)
            .with_cooldown_seconds(3600)
    }

    fn engine_with(rules: Vec<AlertRule>) -> (Arc<MetricStore>, AlertEngine) {
        let store = Arc::new(MetricStore::in_memory());
        let engine = AlertEngine::with_rules(Arc::clone(&store), rules, Notifier::disabled());
        (store, engine)
    }

    fn record(store: &MetricStore, name: &str, value: f64, at: DateTime<Utc>) {
        store.record_at(name, value, BTreeMap::new(), at).unwrap();
    }

    struct CountingChannel {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _alert: &Alert) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingChannel;

    #[async_trait]
    impl NotificationChannel for FailingChannel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _alert: &Alert) -> Result<()> {
            Err(Error::Channel {
                channel: "failing".into(),
                reason: "webhook down".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_no_data_no_alert() {
        let (_store, engine) = engine_with(vec![cpu_rule()]);
        assert!(engine.evaluate().await.is_empty());
        assert!(engine.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_stale_data_outside_window_is_ignored() {
        let (store, engine) = engine_with(vec![cpu_rule()]);
        let now = Utc::now();
        record(&store, "cpu_usage", 99.0, now - chrono::Duration::minutes(10));

        assert!(engine.evaluate_at(now).await.is_empty());
    }

    #[tokio::test]
    async fn test_uses_latest_value_in_window() {
        let (store, engine) = engine_with(vec![cpu_rule()]);
        let now = Utc::now();
        record(&store, "cpu_usage", 95.0, now - chrono::Duration::seconds(60));
        record(&store, "cpu_usage", 40.0, now - chrono::Duration::seconds(10));

        assert!(engine.evaluate_at(now).await.is_empty());

        record(&store, "cpu_usage", 91.0, now);
        let fired = engine.evaluate_at(now).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].value, 91.0);
        assert_eq!(engine.rule("high_cpu").unwrap().last_triggered, Some(now));
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_then_allows() {
        let (store, engine) = engine_with(vec![cpu_rule()]);
        let start = Utc::now();

        for minute in 0..10 {
            let now = start + chrono::Duration::minutes(minute);
            record(&store, "cpu_usage", 95.0, now);
            engine.evaluate_at(now).await;
        }
        assert_eq!(engine.history_at(24, start + chrono::Duration::minutes(10)).len(), 1);

        let after = start + chrono::Duration::minutes(61);
        record(&store, "cpu_usage", 95.0, after);
        assert_eq!(engine.evaluate_at(after).await.len(), 1);
        assert_eq!(engine.active_alerts().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_rule_is_skipped() {
        let (store, engine) = engine_with(vec![cpu_rule()]);
        engine.set_rule_enabled("high_cpu", false).unwrap();
        record(&store, "cpu_usage", 95.0, Utc::now());

        assert!(engine.evaluate().await.is_empty());
        assert_matches!(
            engine.set_rule_enabled("missing", true),
            Err(Error::RuleNotFound(_))
        );
    }

    #[tokio::test]
    async fn test_rules_fire_in_registration_order() {
        let rules = vec![
            AlertRule::new("b_disk", "disk_usage", Operator::Gt, 50.0, AlertSeverity::Critical),
            AlertRule::new("a_cpu", "cpu_usage", Operator::Gt, 50.0, AlertSeverity::Info),
        ];
        let (store, engine) = engine_with(rules);
        let now = Utc::now();
        record(&store, "cpu_usage", 60.0, now);
        record(&store, "disk_usage", 60.0, now);

        let fired = engine.evaluate_at(now).await;
        let names: Vec<&str> = fired.iter().map(|a| a.rule_name.as_str()).collect();
        assert_eq!(names, vec!["b_disk", "a_cpu"]);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let counting = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
        });
        let (store, engine) = engine_with(vec![cpu_rule()]);
        let engine = engine
            .with_channel(Arc::new(FailingChannel))
            .with_channel(counting.clone());

        record(&store, "cpu_usage", 95.0, Utc::now());
        let fired = engine.evaluate().await;

        assert_eq!(fired.len(), 1);
        assert_eq!(counting.sent.load(Ordering::SeqCst), 1);
        assert_eq!(engine.active_alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let (store, engine) = engine_with(vec![cpu_rule()]);
        let now = Utc::now();
        record(&store, "cpu_usage", 95.0, now);
        let id = engine.evaluate_at(now).await[0].id.clone();

        let t1 = now + chrono::Duration::minutes(1);
        assert!(engine.resolve_at(&id, "oncall", t1));
        assert!(!engine.resolve_at(&id, "oncall", t1 + chrono::Duration::minutes(1)));

        let history = engine.history_at(24, t1);
        assert_eq!(history.len(), 1);
        assert!(history[0].resolved);
        assert_eq!(history[0].resolved_at, Some(t1));
        assert!(engine.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_publishes_notification() {
        let (notifier, mut rx) = Notifier::channel(16);
        let store = Arc::new(MetricStore::in_memory());
        let engine = AlertEngine::with_rules(Arc::clone(&store), vec![cpu_rule()], notifier);
        record(&store, "cpu_usage", 95.0, Utc::now());

        let id = engine.evaluate().await[0].id.clone();
        engine.resolve(&id, "test");

        let triggered = rx.try_recv().unwrap();
        assert_eq!(triggered.category, NotificationCategory::AlertTriggered);
        assert_eq!(triggered.severity, NotificationSeverity::Normal);
        let resolved = rx.try_recv().unwrap();
        assert_eq!(resolved.category, NotificationCategory::AlertResolved);
    }

    #[tokio::test]
    async fn test_history_window_and_limit() {
        let rule = cpu_rule().with_cooldown_seconds(0);
        let (store, engine) = engine_with(vec![rule]);
        let engine = engine.with_history_limit(3);
        let start = Utc::now();

        for hour in 0..5 {
            let now = start + chrono::Duration::hours(hour);
            record(&store, "cpu_usage", 95.0, now);
            engine.evaluate_at(now).await;
        }

        let end = start + chrono::Duration::hours(4);
        assert_eq!(engine.history_at(1000, end).len(), 3);
        assert_eq!(engine.history_at(1, end).len(), 2);
        assert_eq!(engine.stats().active_alerts, 5);
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, engine) = engine_with(default_rules());
        engine.set_rule_enabled("api_errors", false).unwrap();
        record(&store, "cpu_usage", 95.0, Utc::now());
        record(&store, "disk_usage", 97.0, Utc::now());
        engine.evaluate().await;

        let stats = engine.stats();
        assert_eq!(stats.total_rules, default_rules().len());
        assert_eq!(stats.enabled_rules, default_rules().len() - 1);
        assert_eq!(stats.active_alerts, 2);
        assert_eq!(stats.active_by_severity[&AlertSeverity::Warning], 1);
        assert_eq!(stats.active_by_severity[&AlertSeverity::Critical], 1);
    }

    #[test]
    fn test_load_creates_default_rule_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlertingConfig {
            rules_path: dir.path().join("alert_rules.json"),
            ..Default::default()
        };

        let engine = AlertEngine::load(
            Arc::new(MetricStore::in_memory()),
            &config,
            Notifier::disabled(),
        );
        assert!(config.rules_path.exists());
        assert_eq!(engine.rules(), default_rules());
    }

    #[test]
    fn test_add_and_remove_persist() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlertingConfig {
            rules_path: dir.path().join("alert_rules.json"),
            ..Default::default()
        };
        let store = Arc::new(MetricStore::in_memory());
        let engine = AlertEngine::load(Arc::clone(&store), &config, Notifier::disabled());

        let custom = AlertRule::new("queue_depth", "messages_processed", Operator::Lt, 1.0, AlertSeverity::Info);
        engine.add_rule(custom.clone()).unwrap();
        engine.remove_rule("high_cpu_usage").unwrap();

        let reloaded = AlertEngine::load(store, &config, Notifier::disabled());
        assert_eq!(reloaded.rule("queue_depth"), Some(custom));
        assert!(reloaded.rule("high_cpu_usage").is_none());
        assert_matches!(reloaded.remove_rule("high_cpu_usage"), Err(Error::RuleNotFound(_)));
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let (_store, engine) = engine_with(vec![]);
        let bad = AlertRule::new("", "cpu_usage", Operator::Gt, 1.0, AlertSeverity::Info);
        assert_matches!(engine.add_rule(bad), Err(Error::InvalidRule(_)));
        assert!(engine.rules().is_empty());
    }

    #[test]
    fn test_persistence_failure_keeps_change() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();
        let config = AlertingConfig {
            rules_path: blocker.join("alert_rules.json"),
            ..Default::default()
        };

        let engine = AlertEngine::load(
            Arc::new(MetricStore::in_memory()),
            &config,
            Notifier::disabled(),
        );
        let result = engine.add_rule(cpu_rule());

        assert_matches!(result, Err(Error::Persistence { .. }));
        assert!(engine.rule("high_cpu").is_some());
    }

    const BROKEN_RULE_FILE: &str = r#"{"rules":[{"name":"mine","metric":"cpu_usage","operator":"gt","threshold":50.0,"severity":"warning"},]}"#;

    #[test]
    fn test_unreadable_rule_file_is_backed_up_before_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlertingConfig {
            rules_path: dir.path().join("alert_rules.json"),
            ..Default::default()
        };
        std::fs::write(&config.rules_path, BROKEN_RULE_FILE).unwrap();

        let engine = AlertEngine::load(
            Arc::new(MetricStore::in_memory()),
            &config,
            Notifier::disabled(),
        );
        assert_eq!(engine.rules(), default_rules());

        engine.add_rule(cpu_rule()).unwrap();

        let backup = std::fs::read_to_string(dir.path().join("alert_rules.json.bak")).unwrap();
        assert_eq!(backup, BROKEN_RULE_FILE);
        let rewritten = std::fs::read_to_string(&config.rules_path).unwrap();
        assert!(rewritten.contains("high_cpu"));
    }

    #[test]
    fn test_unreadable_rule_file_without_backup_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let config = AlertingConfig {
            rules_path: dir.path().join("alert_rules.json"),
            ..Default::default()
        };
        std::fs::write(&config.rules_path, BROKEN_RULE_FILE).unwrap();
        // A directory in the backup's place makes the copy fail.
        std::fs::create_dir(dir.path().join("alert_rules.json.bak")).unwrap();

        let engine = AlertEngine::load(
            Arc::new(MetricStore::in_memory()),
            &config,
            Notifier::disabled(),
        );

        assert_matches!(engine.add_rule(cpu_rule()), Err(Error::Persistence { .. }));
        assert_matches!(engine.remove_rule("high_cpu_usage"), Err(Error::Persistence { .. }));
        assert!(engine.rule("high_cpu").is_some());
        assert_eq!(
            std::fs::read_to_string(&config.rules_path).unwrap(),
            BROKEN_RULE_FILE
        );
    }

    #[tokio::test]
    async fn test_replacing_rule_keeps_cooldown() {
        let (store, engine) = engine_with(vec![cpu_rule()]);
        let now = Utc::now() - chrono::Duration::minutes(10);
        record(&store, "cpu_usage", 95.0, now);
        assert_eq!(engine.evaluate_at(now).await.len(), 1);

        engine
            .add_rule(cpu_rule().with_description("CPU saturated"))
            .unwrap();

        let later = now + chrono::Duration::minutes(1);
        record(&store, "cpu_usage", 96.0, later);
        assert!(engine.evaluate_at(later).await.is_empty());

        let rule = engine.rule("high_cpu").unwrap();
        assert_eq!(rule.description, "CPU saturated");
        assert_eq!(rule.last_triggered, Some(now));
    }

    #[tokio::test]
    async fn test_new_rule_ignores_supplied_last_triggered() {
        let (store, engine) = engine_with(vec![]);
        let now = Utc::now();
        let mut rule = cpu_rule().with_cooldown_seconds(300);
        rule.last_triggered = Some(now + chrono::Duration::days(3650));

        engine.add_rule(rule).unwrap();
        assert_eq!(engine.rule("high_cpu").unwrap().last_triggered, None);

        record(&store, "cpu_usage", 95.0, now);
        assert_eq!(engine.evaluate_at(now).await.len(), 1);
    }

    struct PanickingChannel;

    #[async_trait]
    impl NotificationChannel for PanickingChannel {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn send(&self, _alert: &Alert) -> Result<()> {
            panic!("channel bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_channel_does_not_block_others() {
        let (store, engine) = engine_with(vec![cpu_rule()]);
        let counting = Arc::new(CountingChannel {
            sent: AtomicUsize::new(0),
        });
        engine.add_channel(Arc::new(PanickingChannel));
        engine.add_channel(Arc::clone(&counting) as Arc<dyn NotificationChannel>);

        record(&store, "cpu_usage", 95.0, Utc::now());
        let fired = engine.evaluate().await;

        assert_eq!(fired.len(), 1);
        assert_eq!(counting.sent.load(Ordering::SeqCst), 1);
        assert_eq!(engine.active_alerts().len(), 1);
    }
}
