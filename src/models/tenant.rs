use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validators::SLUG_REGEX;

/// Quota limits attached to a subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierLimits {
    /// Aggregate size of all files of non-deleted models.
    pub max_storage_bytes: i64,
    /// Number of non-deleted models. `None` means unlimited.
    #[serde(default)]
    pub max_models: Option<i64>,
    /// Number of members. Recorded for display; not enforced by this engine.
    pub max_members: i64,
}

/// A tenant: the billing and resource-isolation boundary that owns models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub owner_id: Uuid,
    /// Subscription tier name (key into `[tiers.<name>]`).
    pub tier: String,
    pub limits: TierLimits,
    /// Advisory model counter. Display only; never used for enforcement.
    pub cached_model_count: i64,
    /// Advisory storage counter. Display only; never used for enforcement.
    pub cached_storage_bytes: i64,
    /// End of the "fix this yourself" window.
    pub grace_deadline: Option<DateTime<Utc>>,
    /// After this instant the retention sweep evicts the oldest models.
    pub retention_deadline: Option<DateTime<Utc>>,
    /// Set while the owning user has a pending voluntary account deletion.
    pub account_deletion_deadline: Option<DateTime<Utc>>,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Storage key prefix under which every object of this tenant lives.
    pub fn storage_prefix(&self) -> String {
        tenant_storage_prefix(self.id)
    }
}

/// Storage key prefix for a tenant id.
pub fn tenant_storage_prefix(tenant_id: Uuid) -> String {
    format!("tenants/{}/", tenant_id)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTenant {
    /// URL-friendly identifier (lowercase alphanumeric with hyphens)
    #[validate(length(min = 1, max = 64), regex(path = *SLUG_REGEX))]
    pub slug: String,
    /// Display name
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub owner_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub tier: String,
    pub limits: TierLimits,
    #[serde(default)]
    pub billing_customer_id: Option<String>,
    #[serde(default)]
    pub billing_subscription_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_prefix() {
        let id = Uuid::parse_str("7d7e5a4f-3e1c-4a55-9b2f-000000000001").unwrap();
        assert_eq!(
            tenant_storage_prefix(id),
            "tenants/7d7e5a4f-3e1c-4a55-9b2f-000000000001/"
        );
    }

    #[test]
    fn test_create_tenant_validation() {
        let input = CreateTenant {
            slug: "Not A Slug".to_string(),
            name: "Workshop".to_string(),
            owner_id: Uuid::new_v4(),
            tier: "free".to_string(),
            limits: TierLimits {
                max_storage_bytes: 1,
                max_models: None,
                max_members: 1,
            },
            billing_customer_id: None,
            billing_subscription_id: None,
        };
        assert!(input.validate().is_err());

        let valid = CreateTenant {
            slug: "workshop".to_string(),
            ..input
        };
        assert!(valid.validate().is_ok());
    }
}
