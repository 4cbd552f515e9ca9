//! External collaborator configuration: billing provider and notifications.
//!
//! ```toml
//! [billing]
//! type = "http"
//! base_url = "https://billing.internal/v1"
//! api_key = "${BILLING_API_KEY}"
//! timeout_secs = 10
//!
//! [notifications]
//! type = "webhook"
//! url = "https://mailer.internal/hooks/account-deleted"
//! ```

use serde::{Deserialize, Serialize};

/// Billing provider configuration.
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum BillingConfig {
    /// No billing provider; customer operations are skipped.
    #[default]
    Disabled,

    /// REST billing provider.
    Http(HttpBillingConfig),
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingConfig::Disabled => f.write_str("Disabled"),
            BillingConfig::Http(c) => f
                .debug_struct("Http")
                .field("base_url", &c.base_url)
                .field("api_key", &"****")
                .field("timeout_secs", &c.timeout_secs)
                .finish(),
        }
    }
}

impl BillingConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            BillingConfig::Disabled => Ok(()),
            BillingConfig::Http(c) => {
                url::Url::parse(&c.base_url)
                    .map_err(|e| format!("Invalid billing.base_url: {}", e))?;
                if c.api_key.is_empty() {
                    return Err("billing.api_key cannot be empty".to_string());
                }
                if c.timeout_secs == 0 {
                    return Err("billing.timeout_secs must be greater than 0".to_string());
                }
                Ok(())
            }
        }
    }
}

/// REST billing provider settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpBillingConfig {
    /// Base URL of the billing API.
    pub base_url: String,

    /// Bearer token sent with each request.
    pub api_key: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Notification delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum NotificationsConfig {
    /// Log notifications instead of delivering them.
    #[default]
    Log,

    /// POST notifications as JSON to a mailer webhook.
    Webhook(WebhookNotificationsConfig),
}

impl NotificationsConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            NotificationsConfig::Log => Ok(()),
            NotificationsConfig::Webhook(c) => {
                url::Url::parse(&c.url)
                    .map_err(|e| format!("Invalid notifications.url: {}", e))?;
                if c.timeout_secs == 0 {
                    return Err("notifications.timeout_secs must be greater than 0".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Mailer webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookNotificationsConfig {
    /// Endpoint receiving notification payloads.
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}
