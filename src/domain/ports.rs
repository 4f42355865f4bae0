//! Domain Ports (Port/Adapter Pattern)
//!
//! The pipeline's components only ever talk to the outside world through the
//! traits in this module. Built-in and caller-supplied implementations are
//! registered by name and treated uniformly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Pipeline Components                     │
//! │  MetricStore │ HealthCheckRegistry │ AlertEngine │ Analyzer  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Ports (Traits)                            │
//! │  EventPublisher │ SystemSampler │ HealthCheck │ Channel     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Adapters (Impls)                           │
//! │  LoggingEventPublisher │ SysinfoSampler │ builtin checks    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::alerting::Alert;
use crate::domain::events::Notification;
use crate::error::Result;
use crate::health::CheckOutcome;

// =============================================================================
// Notification Transport Port
// =============================================================================

/// Port for the external publish/subscribe transport.
///
/// Implementations may be slow or fail; callers never await them directly but
/// go through [`crate::adapters::Notifier`], which makes publishing
/// fire-and-forget.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single notification.
    async fn publish(&self, notification: Notification) -> Result<()>;

    /// Publish several notifications.
    async fn publish_all(&self, notifications: Vec<Notification>) -> Result<()> {
        for notification in notifications {
            self.publish(notification).await?;
        }
        Ok(())
    }
}

// =============================================================================
// Sampling Port
// =============================================================================

/// One value produced by a [`SystemSampler`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Port for reading host/process statistics on the sampling cadence.
pub trait SystemSampler: Send + Sync {
    /// Take one sample of every metric this sampler knows about.
    fn sample(&self) -> Result<Vec<MetricSample>>;
}

// =============================================================================
// Health Check Port
// =============================================================================

/// Port for a named health check.
///
/// Returning `Err` is equivalent to reporting `unhealthy` with the error text;
/// the registry performs that conversion.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<CheckOutcome>;
}

// =============================================================================
// Notification Channel Port
// =============================================================================

/// Port for delivering a fired alert (chat webhook, e-mail, log, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Name used in logs when delivery fails.
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<()>;
}
