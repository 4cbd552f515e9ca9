use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::TenantRepo,
    },
    models::{CreateTenant, Tenant, TenantUsage, TierLimits},
};

const TENANT_COLUMNS: &str = r#"
    id, slug, name, owner_id, tier, max_storage_bytes, max_models, max_members,
    cached_model_count, cached_storage_bytes, grace_deadline, retention_deadline,
    account_deletion_deadline, billing_customer_id, billing_subscription_id,
    created_at, updated_at
"#;

pub struct SqliteTenantRepo {
    pool: SqlitePool,
}

impl SqliteTenantRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_tenant(row: &SqliteRow) -> DbResult<Tenant> {
        Ok(Tenant {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            slug: row.get("slug"),
            name: row.get("name"),
            owner_id: parse_uuid(&row.get::<String, _>("owner_id"))?,
            tier: row.get("tier"),
            limits: TierLimits {
                max_storage_bytes: row.get("max_storage_bytes"),
                max_models: row.get("max_models"),
                max_members: row.get("max_members"),
            },
            cached_model_count: row.get("cached_model_count"),
            cached_storage_bytes: row.get("cached_storage_bytes"),
            grace_deadline: row.get("grace_deadline"),
            retention_deadline: row.get("retention_deadline"),
            account_deletion_deadline: row.get("account_deletion_deadline"),
            billing_customer_id: row.get("billing_customer_id"),
            billing_subscription_id: row.get("billing_subscription_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl TenantRepo for SqliteTenantRepo {
    async fn create(&self, input: CreateTenant) -> DbResult<Tenant> {
        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(3);

        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, slug, name, owner_id, tier, max_storage_bytes, max_models, max_members,
                billing_customer_id, billing_subscription_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.slug)
        .bind(&input.name)
        .bind(input.owner_id.to_string())
        .bind(&input.tier)
        .bind(input.limits.max_storage_bytes)
        .bind(input.limits.max_models)
        .bind(input.limits.max_members)
        .bind(&input.billing_customer_id)
        .bind(&input.billing_subscription_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("Tenant with slug '{}' already exists", input.slug))
            }
            _ => DbError::from(e),
        })?;

        Ok(Tenant {
            id,
            slug: input.slug,
            name: input.name,
            owner_id: input.owner_id,
            tier: input.tier,
            limits: input.limits,
            cached_model_count: 0,
            cached_storage_bytes: 0,
            grace_deadline: None,
            retention_deadline: None,
            account_deletion_deadline: None,
            billing_customer_id: input.billing_customer_id,
            billing_subscription_id: input.billing_subscription_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Tenant>> {
        let query = format!("SELECT {} FROM tenants WHERE id = ?", TENANT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_tenant).transpose()
    }

    async fn list_all(&self) -> DbResult<Vec<Tenant>> {
        let query = format!(
            "SELECT {} FROM tenants ORDER BY created_at ASC, id ASC",
            TENANT_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::parse_tenant).collect()
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> DbResult<Vec<Tenant>> {
        let query = format!(
            "SELECT {} FROM tenants WHERE owner_id = ? ORDER BY created_at ASC, id ASC",
            TENANT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(owner_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::parse_tenant).collect()
    }

    async fn list_in_grace(&self) -> DbResult<Vec<Tenant>> {
        let query = format!(
            r#"
            SELECT {} FROM tenants
            WHERE grace_deadline IS NOT NULL
            ORDER BY retention_deadline ASC, id ASC
            "#,
            TENANT_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::parse_tenant).collect()
    }

    async fn start_grace(
        &self,
        id: Uuid,
        grace_deadline: DateTime<Utc>,
        retention_deadline: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET grace_deadline = ?, retention_deadline = ?, updated_at = ?
            WHERE id = ? AND grace_deadline IS NULL
            "#,
        )
        .bind(grace_deadline)
        .bind(retention_deadline)
        .bind(Utc::now().trunc_subsecs(3))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_grace(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET grace_deadline = NULL, retention_deadline = NULL, updated_at = ?
            WHERE id = ? AND grace_deadline IS NOT NULL
            "#,
        )
        .bind(Utc::now().trunc_subsecs(3))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_tier(&self, id: Uuid, tier: &str, limits: TierLimits) -> DbResult<Tenant> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET tier = ?, max_storage_bytes = ?, max_models = ?, max_members = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(tier)
        .bind(limits.max_storage_bytes)
        .bind(limits.max_models)
        .bind(limits.max_members)
        .bind(Utc::now().trunc_subsecs(3))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    async fn set_account_deletion_deadline_for_owner(
        &self,
        owner_id: Uuid,
        deadline: Option<DateTime<Utc>>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET account_deletion_deadline = ?, updated_at = ?
            WHERE owner_id = ?
            "#,
        )
        .bind(deadline)
        .bind(Utc::now().trunc_subsecs(3))
        .bind(owner_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn refresh_cached_usage(&self, id: Uuid, usage: TenantUsage) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET cached_model_count = ?, cached_storage_bytes = ?
            WHERE id = ?
            "#,
        )
        .bind(usage.model_count)
        .bind(usage.storage_bytes)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge(&self, id: Uuid) -> DbResult<()> {
        let tenant_id = id.to_string();
        let mut tx = self.pool.begin().await?;

        // Children first; foreign keys are enforced.
        sqlx::query(
            r#"
            DELETE FROM model_files WHERE version_id IN (
                SELECT v.id FROM model_versions v
                JOIN models m ON m.id = v.model_id
                WHERE m.tenant_id = ?
            )
            "#,
        )
        .bind(&tenant_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM model_versions WHERE model_id IN (SELECT id FROM models WHERE tenant_id = ?)",
        )
        .bind(&tenant_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM model_tags WHERE model_id IN (SELECT id FROM models WHERE tenant_id = ?)",
        )
        .bind(&tenant_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM tags WHERE tenant_id = ?")
            .bind(&tenant_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM models WHERE tenant_id = ?")
            .bind(&tenant_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE sessions SET active_tenant_id = NULL WHERE active_tenant_id = ?")
            .bind(&tenant_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(&tenant_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}
