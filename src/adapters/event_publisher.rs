//! Event Publisher Adapters
//!
//! Implements the `EventPublisher` port with various backends.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::events::{Notification, NotificationSeverity};
use crate::domain::ports::EventPublisher;
use crate::error::Result;

/// Logging-based publisher.
///
/// Writes notifications to the tracing system. Metric recordings are noisy, so
/// anything below `min_info_severity` is logged at debug level.
#[derive(Debug, Clone)]
pub struct LoggingEventPublisher {
    min_info_severity: NotificationSeverity,
}

impl Default for LoggingEventPublisher {
    fn default() -> Self {
        Self {
            min_info_severity: NotificationSeverity::Normal,
        }
    }
}

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log everything at info level.
    pub fn info_level() -> Self {
        Self {
            min_info_severity: NotificationSeverity::Low,
        }
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, notification: Notification) -> Result<()> {
        let payload = notification.payload.to_string();

        if notification.severity >= self.min_info_severity {
            info!(
                category = %notification.category,
                severity = %notification.severity,
                source = %notification.source,
                payload = %payload,
                "Notification"
            );
        } else {
            debug!(
                category = %notification.category,
                severity = %notification.severity,
                source = %notification.source,
                payload = %payload,
                "Notification"
            );
        }

        Ok(())
    }
}

/// In-memory collector for testing and for hosts that poll notifications.
#[derive(Debug, Default)]
pub struct InMemoryEventCollector {
    notifications: parking_lot::RwLock<Vec<Notification>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }

    pub fn len(&self) -> usize {
        self.notifications.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.read().is_empty()
    }

    pub fn clear(&self) {
        self.notifications.write().clear();
    }

    /// Notifications of a given category (`"alert_triggered"`, ...).
    pub fn of_category(&self, category: &str) -> Vec<Notification> {
        self.notifications
            .read()
            .iter()
            .filter(|n| n.category.as_str() == category)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventCollector {
    async fn publish(&self, notification: Notification) -> Result<()> {
        self.notifications.write().push(notification);
        Ok(())
    }

    async fn publish_all(&self, notifications: Vec<Notification>) -> Result<()> {
        self.notifications.write().extend(notifications);
        Ok(())
    }
}
