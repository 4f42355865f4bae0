//! Prometheus Exposition Adapter
//!
//! Renders a dashboard snapshot in the Prometheus text format. Gauges live in
//! a private registry and are overwritten from each snapshot, so series that
//! disappear from the snapshot are dropped by resetting before every render.

use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::dashboard::DashboardSnapshot;
use crate::error::{Error, Result};
use crate::health::HealthStatus;

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

/// Exposes the pipeline state as Prometheus gauges.
pub struct PrometheusExporter {
    registry: Registry,
    metric_latest: GaugeVec,
    metric_average: GaugeVec,
    health_status: GaugeVec,
    active_alerts: GaugeVec,
    performance_score: Gauge,
    slo_current: GaugeVec,
    budget_remaining: GaugeVec,
}

impl PrometheusExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gauge_vec = |name: &str, help: &str, label: &str| -> Result<GaugeVec> {
            let gauge = GaugeVec::new(Opts::new(name, help), &[label]).map_err(prom_err)?;
            registry.register(Box::new(gauge.clone())).map_err(prom_err)?;
            Ok(gauge)
        };

        let metric_latest = gauge_vec(
            "pulsewatch_metric_latest",
            "Most recent recorded value per metric series",
            "metric",
        )?;
        let metric_average = gauge_vec(
            "pulsewatch_metric_window_average",
            "Average over the dashboard summary window per metric series",
            "metric",
        )?;
        let health_status = gauge_vec(
            "pulsewatch_health_check_status",
            "Latest health check status (0 healthy, 1 degraded, 2 unhealthy)",
            "check",
        )?;
        let active_alerts = gauge_vec(
            "pulsewatch_active_alerts",
            "Unresolved alerts by severity",
            "severity",
        )?;
        let slo_current = gauge_vec(
            "pulsewatch_slo_current_percent",
            "Share of the SLO window satisfying its objective",
            "slo",
        )?;
        let budget_remaining = gauge_vec(
            "pulsewatch_error_budget_remaining_minutes",
            "Remaining error budget per SLO",
            "slo",
        )?;

        let performance_score = Gauge::new(
            "pulsewatch_performance_score",
            "Mean baseline score over metrics with data",
        )
        .map_err(prom_err)?;
        registry
            .register(Box::new(performance_score.clone()))
            .map_err(prom_err)?;

        Ok(Self {
            registry,
            metric_latest,
            metric_average,
            health_status,
            active_alerts,
            performance_score,
            slo_current,
            budget_remaining,
        })
    }

    fn update(&self, snapshot: &DashboardSnapshot) {
        for gauge in [
            &self.metric_latest,
            &self.metric_average,
            &self.health_status,
            &self.active_alerts,
            &self.slo_current,
            &self.budget_remaining,
        ] {
            gauge.reset();
        }

        for (name, summary) in &snapshot.metrics {
            if let Some(latest) = summary.latest {
                self.metric_latest.with_label_values(&[name.as_str()]).set(latest);
            }
            if let Some(average) = summary.average {
                self.metric_average.with_label_values(&[name.as_str()]).set(average);
            }
        }

        for check in &snapshot.health.checks {
            let value = match check.status {
                HealthStatus::Healthy => 0.0,
                HealthStatus::Degraded => 1.0,
                HealthStatus::Unhealthy => 2.0,
                HealthStatus::Unknown => continue,
            };
            self.health_status
                .with_label_values(&[check.name.as_str()])
                .set(value);
        }

        for alert in &snapshot.alerts.active {
            self.active_alerts
                .with_label_values(&[alert.severity.as_str()])
                .inc();
        }

        match snapshot.performance.score {
            Some(score) => self.performance_score.set(score),
            None => self.performance_score.set(f64::NAN),
        }

        for slo in &snapshot.slos {
            if let Some(current) = slo.current_value {
                self.slo_current
                    .with_label_values(&[slo.name.as_str()])
                    .set(current);
            }
        }
        for budget in &snapshot.error_budgets {
            self.budget_remaining
                .with_label_values(&[budget.slo_name.as_str()])
                .set(budget.remaining_minutes);
        }
    }

    /// Update every gauge from `snapshot` and encode the registry.
    pub fn render(&self, snapshot: &DashboardSnapshot) -> Result<String> {
        self.update(snapshot);

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom_err)?;

        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl std::fmt::Debug for PrometheusExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusExporter").finish_non_exhaustive()
    }
}
