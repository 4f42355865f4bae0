//! Performance Analyzer
//!
//! Compares window averages against baselines, scores them and derives
//! recommendations. Owns the second of the pipeline's two background loops,
//! which generates a report on every tick.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::baseline::{default_baselines, parse_baselines, PerformanceBaseline, ViolationSeverity};
use crate::adapters::Notifier;
use crate::config::PerformanceConfig;
use crate::domain::events::{NotificationCategory, NotificationSeverity};
use crate::error::Result;
use crate::metrics::MetricStore;
use crate::task::{PeriodicTask, DEFAULT_STOP_TIMEOUT};

/// Default window averages are taken over
pub const DEFAULT_ANALYSIS_WINDOW: Duration = Duration::from_secs(300);

/// Default bound on retained reports
pub const DEFAULT_REPORT_HISTORY: usize = 100;

// Recommendation triggers
const MEMORY_CLEANUP_MB: f64 = 800.0;
const SLOW_API_MS: f64 = 1000.0;
const HIGH_CPU_PERCENT: f64 = 80.0;
const HIGH_ERROR_RATE_PERCENT: f64 = 5.0;
const SLOW_EVENT_MS: f64 = 100.0;

// =============================================================================
// Report Types
// =============================================================================

/// Live figures for one baselined metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPerformance {
    pub average: f64,
    pub max: f64,
    pub samples: usize,
    pub unit: String,
    pub score: f64,
    pub status: Option<ViolationSeverity>,
}

/// A baseline exceeded by its window average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub metric: String,
    pub severity: ViolationSeverity,
    pub value: f64,
    /// Threshold that was crossed
    pub threshold: f64,
    pub target: f64,
    pub unit: String,
}

/// Operator-facing advice derived from the current averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub metric: String,
    pub message: String,
}

impl Recommendation {
    fn new(metric: &str, message: String) -> Self {
        Self {
            metric: metric.to_string(),
            message,
        }
    }
}

/// Point-in-time performance assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub timestamp: DateTime<Utc>,
    pub window_seconds: u64,
    /// Baselined metrics that had data in the window
    pub metrics: BTreeMap<String, MetricPerformance>,
    pub baselines: Vec<PerformanceBaseline>,
    pub violations: Vec<Violation>,
    pub recommendations: Vec<Recommendation>,
    /// Mean score over metrics with data; `None` when nothing had data
    pub score: Option<f64>,
}

// =============================================================================
// Analyzer
// =============================================================================

/// Baseline comparison, scoring and report history.
pub struct PerformanceAnalyzer {
    store: Arc<MetricStore>,
    baselines: RwLock<Vec<PerformanceBaseline>>,
    reports: Mutex<VecDeque<PerformanceReport>>,
    window: Duration,
    history_limit: usize,
    notifier: Notifier,
    monitor: PeriodicTask,
}

impl PerformanceAnalyzer {
    /// Analyzer with the built-in baselines.
    pub fn new(store: Arc<MetricStore>, notifier: Notifier) -> Self {
        Self::with_baselines(store, default_baselines(), notifier)
    }

    pub fn with_baselines(
        store: Arc<MetricStore>,
        baselines: Vec<PerformanceBaseline>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            baselines: RwLock::new(baselines),
            reports: Mutex::new(VecDeque::new()),
            window: DEFAULT_ANALYSIS_WINDOW,
            history_limit: DEFAULT_REPORT_HISTORY,
            notifier,
            monitor: PeriodicTask::new("performance-monitor"),
        }
    }

    /// Analyzer configured from `config`; no configured baselines means the
    /// built-in set.
    pub fn from_config(store: Arc<MetricStore>, config: &PerformanceConfig, notifier: Notifier) -> Self {
        let baselines = if config.baselines.is_empty() {
            default_baselines()
        } else {
            parse_baselines(&config.baselines)
        };

        let mut analyzer = Self::with_baselines(store, baselines, notifier);
        if !config.analysis_window().is_zero() {
            analyzer.window = config.analysis_window();
        }
        analyzer.history_limit = config.report_history_limit.max(1);
        analyzer
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // -------------------------------------------------------------------------
    // Baselines
    // -------------------------------------------------------------------------

    /// Add or replace the baseline for a metric.
    pub fn add_baseline(&self, baseline: PerformanceBaseline) -> Result<()> {
        baseline.validate()?;

        let mut baselines = self.baselines.write();
        match baselines.iter_mut().find(|b| b.metric == baseline.metric) {
            Some(existing) => *existing = baseline,
            None => baselines.push(baseline),
        }
        Ok(())
    }

    pub fn remove_baseline(&self, metric: &str) -> bool {
        let mut baselines = self.baselines.write();
        let before = baselines.len();
        baselines.retain(|b| b.metric != metric);
        baselines.len() != before
    }

    pub fn baselines(&self) -> Vec<PerformanceBaseline> {
        self.baselines.read().clone()
    }

    pub fn baseline(&self, metric: &str) -> Option<PerformanceBaseline> {
        self.baselines.read().iter().find(|b| b.metric == metric).cloned()
    }

    // -------------------------------------------------------------------------
    // Analysis
    // -------------------------------------------------------------------------

    pub fn analyze(&self) -> PerformanceReport {
        self.analyze_at(Utc::now())
    }

    /// Build a report without recording it.
    pub fn analyze_at(&self, now: DateTime<Utc>) -> PerformanceReport {
        let baselines = self.baselines();
        let mut metrics = BTreeMap::new();
        let mut violations = Vec::new();

        for baseline in &baselines {
            let points = self.store.query_recent_at(&baseline.metric, self.window, now);
            if points.is_empty() {
                continue;
            }

            let average = points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64;
            let max = points.iter().map(|p| p.value).fold(f64::MIN, f64::max);
            let status = baseline.classify(average);

            if let Some(severity) = status {
                violations.push(Violation {
                    metric: baseline.metric.clone(),
                    severity,
                    value: average,
                    threshold: match severity {
                        ViolationSeverity::Critical => baseline.critical_threshold,
                        ViolationSeverity::Warning => baseline.warning_threshold,
                    },
                    target: baseline.target,
                    unit: baseline.unit.clone(),
                });
            }

            metrics.insert(
                baseline.metric.clone(),
                MetricPerformance {
                    average,
                    max,
                    samples: points.len(),
                    unit: baseline.unit.clone(),
                    score: baseline.score(average),
                    status,
                },
            );
        }

        let score = if metrics.is_empty() {
            None
        } else {
            Some(metrics.values().map(|m| m.score).sum::<f64>() / metrics.len() as f64)
        };

        PerformanceReport {
            timestamp: now,
            window_seconds: self.window.as_secs(),
            recommendations: self.recommendations(now),
            metrics,
            baselines,
            violations,
            score,
        }
    }

    fn recommendations(&self, now: DateTime<Utc>) -> Vec<Recommendation> {
        let avg = |metric: &str| self.store.average_at(metric, self.window, now);
        let mut out = Vec::new();

        if let Some(memory) = avg("memory_usage").filter(|v| *v > MEMORY_CLEANUP_MB) {
            out.push(Recommendation::new(
                "memory_usage",
                format!(
                    "Memory averaging {:.0} MB; clear caches or restart long-running workers",
                    memory
                ),
            ));
        }
        if let Some(latency) = avg("api_response_time").filter(|v| *v > SLOW_API_MS) {
            out.push(Recommendation::new(
                "api_response_time",
                format!(
                    "API responses averaging {:.0} ms; add caching or optimise slow endpoints",
                    latency
                ),
            ));
        }
        if let Some(cpu) = avg("cpu_usage").filter(|v| *v > HIGH_CPU_PERCENT) {
            out.push(Recommendation::new(
                "cpu_usage",
                format!(
                    "CPU averaging {:.1}%; profile hot paths or add capacity",
                    cpu
                ),
            ));
        }

        let requests = self.store.sum_at("api_requests_total", self.window, now);
        let errors = self.store.sum_at("api_errors_total", self.window, now);
        if let (Some(requests), Some(errors)) = (requests, errors) {
            if requests > 0.0 {
                let rate = errors / requests * 100.0;
                if rate > HIGH_ERROR_RATE_PERCENT {
                    out.push(Recommendation::new(
                        "api_errors_total",
                        format!(
                            "API error rate at {:.1}%; inspect recent failures and upstream dependencies",
                            rate
                        ),
                    ));
                }
            }
        }

        if let Some(events) = avg("event_processing_time").filter(|v| *v > SLOW_EVENT_MS) {
            out.push(Recommendation::new(
                "event_processing_time",
                format!(
                    "Event processing averaging {:.0} ms; batch or offload slow handlers",
                    events
                ),
            ));
        }

        out
    }

    /// Build a report, append it to history and announce its violations.
    pub fn generate_report(&self) -> PerformanceReport {
        self.generate_report_at(Utc::now())
    }

    #[instrument(skip(self))]
    pub fn generate_report_at(&self, now: DateTime<Utc>) -> PerformanceReport {
        let report = self.analyze_at(now);

        for violation in &report.violations {
            warn!(
                metric = %violation.metric,
                severity = %violation.severity,
                value = violation.value,
                threshold = violation.threshold,
                "Performance baseline violated"
            );
            self.notifier.notify(
                NotificationCategory::PerformanceViolation,
                serde_json::to_value(violation).unwrap_or_default(),
                match violation.severity {
                    ViolationSeverity::Critical => NotificationSeverity::High,
                    ViolationSeverity::Warning => NotificationSeverity::Normal,
                },
                "performance_analyzer",
            );
        }

        {
            let mut reports = self.reports.lock();
            reports.push_back(report.clone());
            while reports.len() > self.history_limit {
                reports.pop_front();
            }
        }

        debug!(
            score = ?report.score,
            violations = report.violations.len(),
            "Performance report generated"
        );
        report
    }

    pub fn latest_report(&self) -> Option<PerformanceReport> {
        self.reports.lock().back().cloned()
    }

    /// Retained reports, oldest first.
    pub fn reports(&self) -> Vec<PerformanceReport> {
        self.reports.lock().iter().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Background monitoring
    // -------------------------------------------------------------------------

    /// Generate a report every `period`. A second call is a no-op.
    pub fn start_monitoring(self: &Arc<Self>, period: Duration) -> bool {
        let analyzer = Arc::clone(self);
        let started = self.monitor.start(period, move || {
            let analyzer = Arc::clone(&analyzer);
            async move {
                analyzer.generate_report();
            }
        });

        if started {
            info!(period_secs = period.as_secs(), "Performance monitoring started");
        }
        started
    }

    /// Stop the monitoring loop, waiting until it has halted.
    pub async fn stop_monitoring(&self) -> bool {
        self.monitor.stop(DEFAULT_STOP_TIMEOUT).await
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }
}

impl std::fmt::Debug for PerformanceAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceAnalyzer")
            .field("baselines", &self.baselines.read().len())
            .field("window", &self.window)
            .field("history_limit", &self.history_limit)
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}
