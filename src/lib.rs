//! Pulsewatch - Embedded Observability Pipeline
//!
//! Metric collection, health checks, threshold alerting, performance baselines
//! and an SLO/error-budget dashboard for a single process.
//!
//! # Architecture
//!
//! ```text
//!   external record()        sampling task
//!          │                      │
//!          ▼                      ▼
//!   ┌─────────────────────────────────────┐
//!   │             MetricStore              │
//!   └──────┬──────────────────┬───────────┘
//!          │                  │
//!          ▼                  ▼
//!   ┌─────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//!   │ AlertEngine │   │ PerformanceAnalyzer │   │ HealthCheckRegistry │
//!   └──────┬──────┘   └──────────┬──────────┘   └──────────┬──────────┘
//!          └─────────────────────┼─────────────────────────┘
//!                                ▼
//!                   ┌──────────────────────────┐
//!                   │  ObservabilityDashboard  │ ──▶ JSON export, /metrics
//!                   └──────────────────────────┘
//! ```
//!
//! Exactly two background loops exist: metric sampling and performance
//! checking. Alert evaluation, health runs and exports are driven by the host.
//!
//! # Modules
//!
//! - [`adapters`] - Port implementations (logging, sysinfo, webhooks, Prometheus)
//! - [`alerting`] - Alert rules, alerts and the alert engine
//! - [`config`] - Configuration sections and YAML loading
//! - [`dashboard`] - Aggregated snapshot, SLOs and error budgets
//! - [`domain`] - Ports and notifications
//! - [`error`] - Error types
//! - [`health`] - Health check registry and built-in checks
//! - [`metrics`] - Bounded in-memory time series
//! - [`performance`] - Baselines, scoring and reports
//! - [`task`] - Periodic background task lifecycle

pub mod adapters;
pub mod alerting;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod health;
pub mod metrics;
pub mod performance;
mod persist;
pub mod task;

// Re-export commonly used types
pub use alerting::{Alert, AlertEngine, AlertRule, AlertSeverity, Operator};
pub use config::ObservabilityConfig;
pub use dashboard::{DashboardSnapshot, ErrorBudget, ObservabilityDashboard, SloDefinition};
pub use error::{Error, Result};
pub use health::{CheckOutcome, HealthCheckRegistry, HealthStatus};
pub use metrics::MetricStore;
pub use performance::{PerformanceAnalyzer, PerformanceBaseline, PerformanceReport};
