//! Outgoing user notifications.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use crate::config::{NotificationsConfig, WebhookNotificationsConfig};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Notification endpoint returned {0}")]
    Status(u16),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// Delivers user-facing messages. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_account_deletion_completed_email(
        &self,
        email: &str,
        completed_at: DateTime<Utc>,
    ) -> NotifyResult<()>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    email: &'a str,
    completed_at: DateTime<Utc>,
}

/// Posts notifications as JSON to a mailer webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    http_client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookNotificationsConfig) -> NotifyResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_account_deletion_completed_email(
        &self,
        email: &str,
        completed_at: DateTime<Utc>,
    ) -> NotifyResult<()> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&WebhookPayload {
                event: "account_deletion_completed",
                email,
                completed_at,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_account_deletion_completed_email(
        &self,
        email: &str,
        completed_at: DateTime<Utc>,
    ) -> NotifyResult<()> {
        tracing::info!(
            email = %email,
            completed_at = %completed_at,
            "Account deletion completed notification (log only)"
        );
        Ok(())
    }
}

pub fn create_notifier(config: &NotificationsConfig) -> NotifyResult<Arc<dyn Notifier>> {
    match config {
        NotificationsConfig::Log => Ok(Arc::new(LogNotifier)),
        NotificationsConfig::Webhook(webhook) => Ok(Arc::new(WebhookNotifier::new(webhook)?)),
    }
}
