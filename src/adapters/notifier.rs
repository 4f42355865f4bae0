//! Notifier
//!
//! A cheap, cloneable handle that makes publishing fire-and-forget. Components
//! push into a bounded channel with `try_send`; a forwarding task drains the
//! channel into an [`EventPublisher`]. A full or closed channel drops the
//! notification instead of blocking the caller.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::domain::events::{
    Notification, NotificationCategory, NotificationSeverity,
};
use crate::domain::ports::EventPublisher;

/// Default buffer between producers and the forwarding task
pub const DEFAULT_NOTIFIER_CAPACITY: usize = 1024;

/// Non-blocking handle onto the notification transport.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    /// A notifier that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// A notifier backed by a raw channel; the caller owns the receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Spawn a forwarding task that hands every notification to `publisher`.
    ///
    /// The task ends once every clone of the returned notifier is dropped.
    /// Must be called from within a tokio runtime.
    pub fn spawn(publisher: Arc<dyn EventPublisher>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (notifier, mut rx) = Self::channel(capacity);

        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let category = notification.category;
                if let Err(e) = publisher.publish(notification).await {
                    warn!(category = %category, "Failed to publish notification: {}", e);
                }
            }
        });

        (notifier, handle)
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Publish without waiting. Never blocks, never fails.
    pub fn publish(&self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(e) = tx.try_send(notification) {
            match e {
                mpsc::error::TrySendError::Full(n) => {
                    trace!(category = %n.category, "Notification dropped: transport busy");
                }
                mpsc::error::TrySendError::Closed(n) => {
                    trace!(category = %n.category, "Notification dropped: transport closed");
                }
            }
        }
    }

    /// Convenience wrapper building the notification in place.
    pub fn notify(
        &self,
        category: NotificationCategory,
        payload: serde_json::Value,
        severity: NotificationSeverity,
        source: &str,
    ) {
        if self.is_enabled() {
            self.publish(Notification::new(category, payload, severity, source));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryEventCollector;
    use std::time::Duration;

    #[test]
    fn test_disabled_notifier_is_noop() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        notifier.notify(
            NotificationCategory::MetricRecorded,
            serde_json::json!({}),
            NotificationSeverity::Low,
            "test",
        );
    }

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (notifier, mut rx) = Notifier::channel(1);

        for _ in 0..5 {
            notifier.notify(
                NotificationCategory::MetricRecorded,
                serde_json::json!({}),
                NotificationSeverity::Low,
                "test",
            );
        }

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_does_not_fail() {
        let (notifier, rx) = Notifier::channel(4);
        drop(rx);
        notifier.notify(
            NotificationCategory::AlertTriggered,
            serde_json::json!({}),
            NotificationSeverity::High,
            "test",
        );
    }

    #[tokio::test]
    async fn test_spawned_forwarder_delivers() {
        let collector = Arc::new(InMemoryEventCollector::new());
        let (notifier, handle) = Notifier::spawn(collector.clone(), 16);

        notifier.notify(
            NotificationCategory::AlertTriggered,
            serde_json::json!({"rule": "r"}),
            NotificationSeverity::High,
            "alert_engine",
        );
        drop(notifier);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(collector.of_category("alert_triggered").len(), 1);
    }
}
