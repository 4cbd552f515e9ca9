use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateTenant, Tenant, TenantUsage, TierLimits},
};

/// Repository trait for tenant operations
#[async_trait]
pub trait TenantRepo: Send + Sync {
    async fn create(&self, input: CreateTenant) -> DbResult<Tenant>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Tenant>>;

    /// List every tenant, oldest first.
    async fn list_all(&self) -> DbResult<Vec<Tenant>>;

    /// List tenants owned by a user.
    async fn list_by_owner(&self, owner_id: Uuid) -> DbResult<Vec<Tenant>>;

    /// List tenants that currently have a grace deadline.
    async fn list_in_grace(&self) -> DbResult<Vec<Tenant>>;

    /// Set both deadlines unless a grace deadline is already present.
    /// Returns `true` if this call set them.
    async fn start_grace(
        &self,
        id: Uuid,
        grace_deadline: DateTime<Utc>,
        retention_deadline: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Clear both deadlines. Returns `true` if a grace deadline was set.
    async fn clear_grace(&self, id: Uuid) -> DbResult<bool>;

    /// Switch a tenant to another tier and its limits.
    async fn update_tier(&self, id: Uuid, tier: &str, limits: TierLimits) -> DbResult<Tenant>;

    /// Mirror a user's deletion deadline onto every tenant they own.
    /// Returns the number of tenants updated.
    async fn set_account_deletion_deadline_for_owner(
        &self,
        owner_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> DbResult<u64>;

    /// Overwrite the advisory counters with a fresh ground-truth reading.
    async fn refresh_cached_usage(&self, id: Uuid, usage: TenantUsage) -> DbResult<()>;

    /// Delete the tenant and every dependent row in one transaction.
    /// Sessions pointing at the tenant have their active tenant cleared.
    async fn purge(&self, id: Uuid) -> DbResult<()>;
}
