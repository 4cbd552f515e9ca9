//! Billing provider client.
//!
//! Each tenant may carry a billing customer and subscription reference. The
//! account deletion sweep revokes both on a best-effort basis; failures are
//! logged by the caller and never abort a deletion.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{BillingConfig, HttpBillingConfig};

/// Error type for billing provider operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Billing API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Billing is disabled")]
    Disabled,
}

pub type BillingResult<T> = Result<T, BillingError>;

/// External subscription billing system.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Register a billing customer for a tenant and return its reference.
    async fn create_customer(&self, tenant_id: Uuid, name: &str, email: &str)
    -> BillingResult<String>;

    /// Delete a customer. Deleting an unknown customer succeeds.
    async fn delete_customer(&self, customer_id: &str) -> BillingResult<()>;

    /// Cancel a subscription immediately. Revoking an unknown subscription succeeds.
    async fn revoke_subscription(&self, subscription_id: &str) -> BillingResult<()>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct CreateCustomerRequest<'a> {
    tenant_id: Uuid,
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// REST billing API client authenticated with a bearer key.
#[derive(Clone)]
pub struct HttpBillingProvider {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl HttpBillingProvider {
    pub fn new(config: &HttpBillingConfig) -> BillingResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn delete(&self, path: &str) -> BillingResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(url = %url, "Billing object already gone");
            return Ok(());
        }
        check_status(response).await.map(|_| ())
    }
}

/// Turn a non-success response into `BillingError::Api`.
async fn check_status(response: reqwest::Response) -> BillingResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or(body);

    Err(BillingError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl BillingProvider for HttpBillingProvider {
    async fn create_customer(
        &self,
        tenant_id: Uuid,
        name: &str,
        email: &str,
    ) -> BillingResult<String> {
        let url = format!("{}/customers", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&CreateCustomerRequest {
                tenant_id,
                name,
                email,
            })
            .send()
            .await?;

        let customer: CustomerResponse = check_status(response).await?.json().await?;
        Ok(customer.id)
    }

    async fn delete_customer(&self, customer_id: &str) -> BillingResult<()> {
        self.delete(&format!("/customers/{}", customer_id)).await
    }

    async fn revoke_subscription(&self, subscription_id: &str) -> BillingResult<()> {
        self.delete(&format!("/subscriptions/{}", subscription_id))
            .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Used when no billing system is configured. Deletes are no-ops.
#[derive(Debug, Clone, Default)]
pub struct DisabledBillingProvider;

#[async_trait]
impl BillingProvider for DisabledBillingProvider {
    async fn create_customer(
        &self,
        _tenant_id: Uuid,
        _name: &str,
        _email: &str,
    ) -> BillingResult<String> {
        Err(BillingError::Disabled)
    }

    async fn delete_customer(&self, _customer_id: &str) -> BillingResult<()> {
        Ok(())
    }

    async fn revoke_subscription(&self, _subscription_id: &str) -> BillingResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Create a billing provider from configuration.
pub fn create_billing_provider(config: &BillingConfig) -> BillingResult<Arc<dyn BillingProvider>> {
    match config {
        BillingConfig::Disabled => Ok(Arc::new(DisabledBillingProvider)),
        BillingConfig::Http(http) => {
            tracing::info!(base_url = %http.base_url, "Using HTTP billing provider");
            Ok(Arc::new(HttpBillingProvider::new(http)?))
        }
    }
}
