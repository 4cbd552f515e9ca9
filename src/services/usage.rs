use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::{DbPool, DbResult},
    models::TenantUsage,
};

/// Ground-truth usage accounting.
///
/// Every enforcement decision goes through here instead of reading the
/// tenant's cached counters.
#[derive(Clone)]
pub struct UsageService {
    db: Arc<DbPool>,
}

impl UsageService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Model count and aggregate bytes over non-deleted models.
    pub async fn compute_usage(&self, tenant_id: Uuid) -> DbResult<TenantUsage> {
        self.db.usage().compute_usage(tenant_id).await
    }

    /// Recompute usage and overwrite the advisory counters with it.
    pub async fn refresh_cached(&self, tenant_id: Uuid) -> DbResult<TenantUsage> {
        let usage = self.compute_usage(tenant_id).await?;
        self.db
            .tenants()
            .refresh_cached_usage(tenant_id, usage)
            .await?;
        Ok(usage)
    }
}
