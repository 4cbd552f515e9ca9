use async_trait::async_trait;
use uuid::Uuid;

use crate::{db::error::DbResult, models::TenantUsage};

/// Ground-truth usage aggregation.
#[async_trait]
pub trait UsageRepo: Send + Sync {
    /// Count non-deleted models and sum their file sizes. Read-only.
    async fn compute_usage(&self, tenant_id: Uuid) -> DbResult<TenantUsage>;
}
