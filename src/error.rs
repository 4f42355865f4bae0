//! Error types for the observability pipeline

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the observability pipeline
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // Metric Errors
    // =========================================================================
    /// Metric series was never registered
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// Recorded value is NaN or infinite
    #[error("Invalid value {value} for metric {metric}")]
    InvalidValue { metric: String, value: f64 },

    /// System sampling failed
    #[error("Sampling failed: {0}")]
    Sampling(String),

    // =========================================================================
    // Alerting Errors
    // =========================================================================
    /// Alert rule failed validation
    #[error("Invalid alert rule: {0}")]
    InvalidRule(String),

    /// Alert rule not found
    #[error("Alert rule not found: {0}")]
    RuleNotFound(String),

    /// Notification channel delivery failed
    #[error("Notification channel '{channel}' failed: {reason}")]
    Channel { channel: String, reason: String },

    // =========================================================================
    // Performance Errors
    // =========================================================================
    /// Performance baseline failed validation
    #[error("Invalid performance baseline: {0}")]
    InvalidBaseline(String),

    // =========================================================================
    // Health & Persistence Errors
    // =========================================================================
    /// Health check failed to execute
    #[error("Health check failed: {0}")]
    HealthCheck(String),

    /// Writing or reading a persisted file failed
    #[error("Persistence failed for {path}: {reason}")]
    Persistence { path: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a persistence error for a path
    pub fn persistence(path: impl AsRef<std::path::Path>, reason: impl std::fmt::Display) -> Self {
        Error::Persistence {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}
