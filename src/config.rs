//! Observability Configuration
//!
//! All tunables of the pipeline, grouped per component. Every field has a
//! default so a partial YAML file (or none at all) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Root Configuration
// =============================================================================

/// Top-level configuration for the observability pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Metric store settings
    pub metrics: MetricsConfig,
    /// Alert engine settings
    pub alerting: AlertingConfig,
    /// Performance analyzer settings
    pub performance: PerformanceConfig,
    /// Health check settings
    pub health: HealthConfig,
    /// Dashboard settings
    pub dashboard: DashboardConfig,
}

impl ObservabilityConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&raw)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.metrics.series_capacity == 0 {
            return Err(Error::Config("metrics.series_capacity must be > 0".into()));
        }
        if self.metrics.sampling_interval_secs == 0 {
            return Err(Error::Config(
                "metrics.sampling_interval_secs must be > 0".into(),
            ));
        }
        if self.performance.check_interval_secs == 0 {
            return Err(Error::Config(
                "performance.check_interval_secs must be > 0".into(),
            ));
        }
        let h = &self.health;
        if h.resource_warning_percent >= h.resource_critical_percent {
            return Err(Error::Config(
                "health.resource_warning_percent must be below resource_critical_percent".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Component Sections
// =============================================================================

/// Metric store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Maximum points retained per series
    pub series_capacity: usize,
    /// Interval of the background sampling task
    pub sampling_interval_secs: u64,
    /// Window used for per-metric summaries on the dashboard
    pub summary_window_secs: u64,
}

impl MetricsConfig {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    pub fn summary_window(&self) -> Duration {
        Duration::from_secs(self.summary_window_secs)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            series_capacity: 1000,
            sampling_interval_secs: 30,
            summary_window_secs: 3600,
        }
    }
}

/// Alert engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// JSON file holding the rule set
    pub rules_path: PathBuf,
    /// Cadence the host uses to call `evaluate`
    pub evaluation_interval_secs: u64,
    /// Maximum alerts retained in history
    pub history_limit: usize,
    /// Endpoints receiving every fired alert as JSON
    pub webhook_urls: Vec<String>,
    /// Timeout of a single webhook delivery
    pub webhook_timeout_secs: u64,
}

impl AlertingConfig {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs.max(1))
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs.max(1))
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("data/alert_rules.json"),
            evaluation_interval_secs: 60,
            history_limit: 10_000,
            webhook_urls: Vec::new(),
            webhook_timeout_secs: 10,
        }
    }
}

/// Performance analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Interval of the background performance check
    pub check_interval_secs: u64,
    /// Window the live averages are computed over
    pub analysis_window_secs: u64,
    /// Maximum reports retained in history
    pub report_history_limit: usize,
    /// Baseline entries; malformed ones are skipped, empty means built-ins
    pub baselines: Vec<serde_yaml::Value>,
}

impl PerformanceConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn analysis_window(&self) -> Duration {
        Duration::from_secs(self.analysis_window_secs)
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            analysis_window_secs: 300,
            report_history_limit: 100,
            baselines: Vec::new(),
        }
    }
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Cadence the host uses to call `run_all`
    pub check_interval_secs: u64,
    /// Endpoint requested by the network connectivity check
    pub network_check_url: String,
    /// Timeout of the connectivity check
    pub network_timeout_secs: u64,
    /// Upper bound on any single check before it is marked unhealthy
    pub check_timeout_secs: u64,
    /// Mount point inspected by the disk check
    pub disk_path: PathBuf,
    /// Directory whose JSON files the integrity check validates
    pub data_dir: PathBuf,
    /// Directory inspected by the log rotation check
    pub log_dir: PathBuf,
    /// Single log file size considered unrotated
    pub max_log_file_bytes: u64,
    /// Total log directory size considered unhealthy
    pub max_log_dir_bytes: u64,
    /// Utilisation above which resource checks report degraded
    pub resource_warning_percent: f64,
    /// Utilisation above which resource checks report unhealthy
    pub resource_critical_percent: f64,
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs.max(1))
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            network_check_url: "https://www.google.com".to_string(),
            network_timeout_secs: 5,
            check_timeout_secs: 30,
            disk_path: PathBuf::from("/"),
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            max_log_file_bytes: 100 * 1024 * 1024,
            max_log_dir_bytes: 1024 * 1024 * 1024,
            resource_warning_percent: 80.0,
            resource_critical_percent: 95.0,
        }
    }
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Where periodic exports are written
    pub export_path: PathBuf,
    /// Cadence the host uses to call `export`
    pub export_interval_secs: u64,
    /// How far back alert history is included in a snapshot
    pub recent_alert_hours: u64,
}

impl DashboardConfig {
    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_secs.max(1))
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            export_path: PathBuf::from("data/dashboard.json"),
            export_interval_secs: 300,
            recent_alert_hours: 24,
        }
    }
}
