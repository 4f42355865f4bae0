//! Observability Dashboard
//!
//! Pulls one view over every component and derives SLO compliance and error
//! budgets from it.
//!
//! # Data Flow
//!
//! ```text
//! ┌─────────────┐  ┌─────────────────────┐  ┌─────────────┐  ┌─────────────────────┐
//! │ MetricStore │  │ HealthCheckRegistry │  │ AlertEngine │  │ PerformanceAnalyzer │
//! └──────┬──────┘  └──────────┬──────────┘  └──────┬──────┘  └──────────┬──────────┘
//!        │ summaries          │ latest results     │ active/recent      │ analyze
//!        └────────────────────┴─────────┬──────────┴────────────────────┘
//!                                       ▼
//!                          ┌──────────────────────────┐
//!                          │  ObservabilityDashboard  │──▶ SLOs + error budgets
//!                          └────────────┬─────────────┘
//!                                       ▼
//!                               DashboardSnapshot ──▶ export (JSON file)
//! ```
//!
//! Building a snapshot never runs health checks, evaluates rules or appends to
//! the report history. The only state it writes is its own SLO and budget
//! fields.

mod slo;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

pub use slo::{default_slos, BudgetStatus, ErrorBudget, SloDefinition, SloObjective, SloStatus};

use crate::alerting::{Alert, AlertEngine, AlertSeverity};
use crate::config::ObservabilityConfig;
use crate::error::{Error, Result};
use crate::health::{HealthCheckRegistry, HealthStatus, HealthSummary};
use crate::metrics::{MetricStore, MetricSummary};
use crate::performance::{PerformanceAnalyzer, PerformanceReport};
use crate::persist;

/// Default window of the per-metric summaries
pub const DEFAULT_SUMMARY_WINDOW: Duration = Duration::from_secs(3600);

// =============================================================================
// Snapshot
// =============================================================================

/// Headline figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub overall_health: HealthStatus,
    pub active_alerts: usize,
    pub critical_alerts: usize,
    pub performance_score: Option<f64>,
    pub slos_meeting: usize,
    pub slos_total: usize,
    pub exhausted_budgets: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsView {
    pub active: Vec<Alert>,
    pub recent_history: Vec<Alert>,
}

/// The exported document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub timestamp: DateTime<Utc>,
    pub summary: DashboardSummary,
    pub metrics: BTreeMap<String, MetricSummary>,
    pub health: HealthSummary,
    pub alerts: AlertsView,
    pub performance: PerformanceReport,
    pub slos: Vec<SloDefinition>,
    pub error_budgets: Vec<ErrorBudget>,
}

// =============================================================================
// Dashboard
// =============================================================================

pub struct ObservabilityDashboard {
    store: Arc<MetricStore>,
    health: Arc<HealthCheckRegistry>,
    alerts: Arc<AlertEngine>,
    analyzer: Arc<PerformanceAnalyzer>,
    slos: RwLock<Vec<SloDefinition>>,
    budgets: RwLock<Vec<ErrorBudget>>,
    summary_window: Duration,
    recent_alert_hours: u64,
}

impl ObservabilityDashboard {
    pub fn new(
        store: Arc<MetricStore>,
        health: Arc<HealthCheckRegistry>,
        alerts: Arc<AlertEngine>,
        analyzer: Arc<PerformanceAnalyzer>,
    ) -> Self {
        let slos = default_slos();
        let budgets = slos.iter().map(ErrorBudget::for_slo).collect();

        Self {
            store,
            health,
            alerts,
            analyzer,
            slos: RwLock::new(slos),
            budgets: RwLock::new(budgets),
            summary_window: DEFAULT_SUMMARY_WINDOW,
            recent_alert_hours: 24,
        }
    }

    /// Apply the summary window and alert lookback from `config`.
    pub fn with_config(mut self, config: &ObservabilityConfig) -> Self {
        self.summary_window = config.metrics.summary_window();
        self.recent_alert_hours = config.dashboard.recent_alert_hours;
        self
    }

    /// Replace the SLO set.
    pub fn with_slos(self, slos: Vec<SloDefinition>) -> Self {
        *self.budgets.write() = slos.iter().map(ErrorBudget::for_slo).collect();
        *self.slos.write() = slos;
        self
    }

    /// SLOs as of the last snapshot.
    pub fn slos(&self) -> Vec<SloDefinition> {
        self.slos.read().clone()
    }

    /// Error budgets as of the last snapshot.
    pub fn error_budgets(&self) -> Vec<ErrorBudget> {
        self.budgets.read().clone()
    }

    /// Recompute SLOs and budgets against the store.
    pub fn refresh_slos_at(&self, now: DateTime<Utc>) -> (Vec<SloDefinition>, Vec<ErrorBudget>) {
        let mut slos = self.slos.write();
        for slo in slos.iter_mut() {
            slo.refresh(&self.store, now);
        }
        let budgets: Vec<ErrorBudget> = slos.iter().map(ErrorBudget::for_slo).collect();
        *self.budgets.write() = budgets.clone();

        (slos.clone(), budgets)
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> DashboardSnapshot {
        let metrics = self.store.summaries_at(self.summary_window, now);
        let health = self.health.summary();
        let alerts = AlertsView {
            active: self.alerts.active_alerts(),
            recent_history: self.alerts.history_at(self.recent_alert_hours, now),
        };
        let performance = self.analyzer.analyze_at(now);
        let (slos, error_budgets) = self.refresh_slos_at(now);

        let summary = DashboardSummary {
            overall_health: health.overall_status,
            active_alerts: alerts.active.len(),
            critical_alerts: alerts
                .active
                .iter()
                .filter(|a| a.severity == AlertSeverity::Critical)
                .count(),
            performance_score: performance.score,
            slos_meeting: slos.iter().filter(|s| s.status == SloStatus::Meeting).count(),
            slos_total: slos.len(),
            exhausted_budgets: error_budgets
                .iter()
                .filter(|b| b.status == BudgetStatus::Exhausted)
                .count(),
        };

        DashboardSnapshot {
            timestamp: now,
            summary,
            metrics,
            health,
            alerts,
            performance,
            slos,
            error_budgets,
        }
    }

    /// Write a fresh snapshot as pretty JSON, creating parent directories.
    ///
    /// Failures are logged and returned; nothing else is affected.
    #[instrument(skip_all)]
    pub async fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = self.snapshot();

        let result = write_snapshot(path, &snapshot).await;
        match &result {
            Ok(()) => debug!(path = %path.display(), "Dashboard exported"),
            Err(e) => error!(path = %path.display(), "Dashboard export failed: {}", e),
        }
        result
    }
}

async fn write_snapshot(path: &Path, snapshot: &DashboardSnapshot) -> Result<()> {
    let body = serde_json::to_vec_pretty(snapshot).map_err(|e| Error::persistence(path, e))?;
    persist::replace_file_async(path, &body)
        .await
        .map_err(|e| Error::persistence(path, e))
}

impl std::fmt::Debug for ObservabilityDashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityDashboard")
            .field("slos", &self.slos.read().len())
            .field("summary_window", &self.summary_window)
            .field("recent_alert_hours", &self.recent_alert_hours)
            .finish()
    }
}
