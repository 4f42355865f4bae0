//! Notification Channel Adapters
//!
//! Implements the `NotificationChannel` port for fired alerts.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::alerting::{Alert, AlertSeverity};
use crate::domain::ports::NotificationChannel;
use crate::error::{Error, Result};

/// Writes fired alerts to the tracing system at a level matching severity.
#[derive(Debug, Clone, Default)]
pub struct LoggingChannel;

#[async_trait]
impl NotificationChannel for LoggingChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            AlertSeverity::Info => info!(
                alert = %alert.id,
                rule = %alert.rule_name,
                value = alert.value,
                "ALERT: {}",
                alert.message
            ),
            AlertSeverity::Warning => warn!(
                alert = %alert.id,
                rule = %alert.rule_name,
                value = alert.value,
                "ALERT: {}",
                alert.message
            ),
            AlertSeverity::Error | AlertSeverity::Critical => error!(
                alert = %alert.id,
                rule = %alert.rule_name,
                severity = %alert.severity,
                value = alert.value,
                "ALERT: {}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// POSTs each fired alert as JSON to a webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build webhook client: {}", e)))?;

        Ok(Self {
            name: format!("webhook:{}", url),
            url,
            client,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| Error::Channel {
                channel: self.name.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(Error::Channel {
                channel: self.name.clone(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }
}
