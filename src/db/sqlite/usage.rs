use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::{
    db::{error::DbResult, repos::UsageRepo},
    models::TenantUsage,
};

pub struct SqliteUsageRepo {
    pool: SqlitePool,
}

impl SqliteUsageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepo for SqliteUsageRepo {
    async fn compute_usage(&self, tenant_id: Uuid) -> DbResult<TenantUsage> {
        // One statement so both aggregates see the same snapshot.
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM models
                 WHERE tenant_id = ?1 AND deleted_at IS NULL) AS model_count,
                (SELECT COALESCE(SUM(f.size_bytes), 0)
                 FROM model_files f
                 JOIN model_versions v ON v.id = f.version_id
                 JOIN models m ON m.id = v.model_id
                 WHERE m.tenant_id = ?1 AND m.deleted_at IS NULL) AS storage_bytes
            "#,
        )
        .bind(tenant_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(TenantUsage {
            model_count: row.get("model_count"),
            storage_bytes: row.get("storage_bytes"),
        })
    }
}
