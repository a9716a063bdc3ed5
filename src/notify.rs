//! Owner notifications sent when a report job finishes.
//!
//! Two [`Notifier`] backends:
//!
//! | Backend | When | Behavior |
//! |---------|------|----------|
//! | [`WebhookNotifier`] | `notify.webhook_url` set | POSTs the notification as JSON |
//! | [`LogNotifier`] | otherwise | Emits a tracing event |
//!
//! Delivery failures are returned to the caller, which logs them; they
//! never change a report's outcome.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use patent_inspector_core::store::{Notification, Notifier};

use crate::config::NotifyConfig;

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Records notifications in the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            report_id = notification.report_id,
            owner = %notification.owner,
            url = %notification.url,
            succeeded = notification.succeeded,
            "report finished"
        );
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Webhook error {}: {}", status, body_text);
        }
        tracing::debug!(report_id = notification.report_id, "webhook delivered");
        Ok(())
    }
}

/// Pick the notifier configured by `[notify]`.
pub fn from_config(config: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url.clone())?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
