use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::RunRepo,
    },
    models::{
        AccountDeletionItemStatus, AccountDeletionRun, AccountDeletionRunItem,
        AccountDeletionRunTotals, NewAccountDeletionRunItem, NewRetentionRunItem,
        RetentionItemOutcome, RetentionRun, RetentionRunItem, RetentionRunTotals, RunStatus,
    },
};

pub struct SqliteRunRepo {
    pool: SqlitePool,
}

impl SqliteRunRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_status(s: &str) -> DbResult<RunStatus> {
        s.parse().map_err(DbError::Internal)
    }

    fn parse_retention_run(row: &SqliteRow) -> DbResult<RetentionRun> {
        Ok(RetentionRun {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            status: Self::parse_status(&row.get::<String, _>("status"))?,
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            tenants_checked: row.get("tenants_checked"),
            tenants_cleaned: row.get("tenants_cleaned"),
            models_deleted: row.get("models_deleted"),
            bytes_freed: row.get("bytes_freed"),
            error_message: row.get("error_message"),
        })
    }

    fn parse_retention_item(row: &SqliteRow) -> DbResult<RetentionRunItem> {
        let deleted_model_ids: Vec<Uuid> =
            serde_json::from_str(&row.get::<String, _>("deleted_model_ids"))?;
        Ok(RetentionRunItem {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            run_id: parse_uuid(&row.get::<String, _>("run_id"))?,
            tenant_id: parse_uuid(&row.get::<String, _>("tenant_id"))?,
            outcome: row
                .get::<String, _>("outcome")
                .parse::<RetentionItemOutcome>()
                .map_err(DbError::Internal)?,
            deleted_model_ids,
            bytes_freed: row.get("bytes_freed"),
            compliant: row.get("compliant"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
        })
    }

    fn parse_account_deletion_run(row: &SqliteRow) -> DbResult<AccountDeletionRun> {
        Ok(AccountDeletionRun {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            status: Self::parse_status(&row.get::<String, _>("status"))?,
            batch_size: row.get("batch_size"),
            max_due_accounts: row.get("max_due_accounts"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            due_accounts: row.get("due_accounts"),
            deleted_accounts: row.get("deleted_accounts"),
            failed_accounts: row.get("failed_accounts"),
            deleted_bytes: row.get("deleted_bytes"),
            error_message: row.get("error_message"),
        })
    }

    fn parse_account_deletion_item(row: &SqliteRow) -> DbResult<AccountDeletionRunItem> {
        Ok(AccountDeletionRunItem {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            run_id: parse_uuid(&row.get::<String, _>("run_id"))?,
            user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
            status: row
                .get::<String, _>("status")
                .parse::<AccountDeletionItemStatus>()
                .map_err(DbError::Internal)?,
            deleted_bytes: row.get("deleted_bytes"),
            tenant_results: serde_json::from_str(&row.get::<String, _>("tenant_results"))?,
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl RunRepo for SqliteRunRepo {
    async fn create_retention_run(&self, started_at: DateTime<Utc>) -> DbResult<RetentionRun> {
        let id = Uuid::new_v4();
        let started_at = started_at.trunc_subsecs(3);

        sqlx::query(
            r#"
            INSERT INTO retention_runs (id, status, started_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(RunStatus::Running.as_str())
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(RetentionRun {
            id,
            status: RunStatus::Running,
            started_at,
            finished_at: None,
            tenants_checked: 0,
            tenants_cleaned: 0,
            models_deleted: 0,
            bytes_freed: 0,
            error_message: None,
        })
    }

    async fn add_retention_item(
        &self,
        run_id: Uuid,
        item: NewRetentionRunItem,
    ) -> DbResult<RetentionRunItem> {
        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(3);
        let deleted_model_ids = serde_json::to_string(&item.deleted_model_ids)?;

        sqlx::query(
            r#"
            INSERT INTO retention_run_items (
                id, run_id, tenant_id, outcome, deleted_model_ids, bytes_freed, compliant,
                error_message, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(run_id.to_string())
        .bind(item.tenant_id.to_string())
        .bind(item.outcome.as_str())
        .bind(&deleted_model_ids)
        .bind(item.bytes_freed)
        .bind(item.compliant)
        .bind(&item.error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(RetentionRunItem {
            id,
            run_id,
            tenant_id: item.tenant_id,
            outcome: item.outcome,
            deleted_model_ids: item.deleted_model_ids,
            bytes_freed: item.bytes_freed,
            compliant: item.compliant,
            error_message: item.error_message,
            created_at: now,
        })
    }

    async fn finish_retention_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        totals: RetentionRunTotals,
        error_message: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE retention_runs
            SET status = ?, finished_at = ?, tenants_checked = ?, tenants_cleaned = ?,
                models_deleted = ?, bytes_freed = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(finished_at.trunc_subsecs(3))
        .bind(totals.tenants_checked)
        .bind(totals.tenants_cleaned)
        .bind(totals.models_deleted)
        .bind(totals.bytes_freed)
        .bind(&error_message)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn get_retention_run(&self, id: Uuid) -> DbResult<Option<RetentionRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, started_at, finished_at, tenants_checked, tenants_cleaned,
                   models_deleted, bytes_freed, error_message
            FROM retention_runs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_retention_run).transpose()
    }

    async fn list_retention_items(&self, run_id: Uuid) -> DbResult<Vec<RetentionRunItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, tenant_id, outcome, deleted_model_ids, bytes_freed, compliant,
                   error_message, created_at
            FROM retention_run_items
            WHERE run_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_retention_item).collect()
    }

    async fn create_account_deletion_run(
        &self,
        batch_size: i64,
        max_due_accounts: i64,
        started_at: DateTime<Utc>,
    ) -> DbResult<AccountDeletionRun> {
        let id = Uuid::new_v4();
        let started_at = started_at.trunc_subsecs(3);

        sqlx::query(
            r#"
            INSERT INTO account_deletion_runs (id, status, batch_size, max_due_accounts, started_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(RunStatus::Running.as_str())
        .bind(batch_size)
        .bind(max_due_accounts)
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(AccountDeletionRun {
            id,
            status: RunStatus::Running,
            batch_size,
            max_due_accounts,
            started_at,
            finished_at: None,
            due_accounts: 0,
            deleted_accounts: 0,
            failed_accounts: 0,
            deleted_bytes: 0,
            error_message: None,
        })
    }

    async fn add_account_deletion_item(
        &self,
        run_id: Uuid,
        item: NewAccountDeletionRunItem,
    ) -> DbResult<AccountDeletionRunItem> {
        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(3);
        let tenant_results = serde_json::to_string(&item.tenant_results)?;

        sqlx::query(
            r#"
            INSERT INTO account_deletion_run_items (
                id, run_id, user_id, status, deleted_bytes, tenant_results, error_message,
                created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(run_id.to_string())
        .bind(item.user_id.to_string())
        .bind(item.status.as_str())
        .bind(item.deleted_bytes)
        .bind(&tenant_results)
        .bind(&item.error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(AccountDeletionRunItem {
            id,
            run_id,
            user_id: item.user_id,
            status: item.status,
            deleted_bytes: item.deleted_bytes,
            tenant_results: item.tenant_results,
            error_message: item.error_message,
            created_at: now,
        })
    }

    async fn finish_account_deletion_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        totals: AccountDeletionRunTotals,
        error_message: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE account_deletion_runs
            SET status = ?, finished_at = ?, due_accounts = ?, deleted_accounts = ?,
                failed_accounts = ?, deleted_bytes = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(finished_at.trunc_subsecs(3))
        .bind(totals.due_accounts)
        .bind(totals.deleted_accounts)
        .bind(totals.failed_accounts)
        .bind(totals.deleted_bytes)
        .bind(&error_message)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn get_account_deletion_run(&self, id: Uuid) -> DbResult<Option<AccountDeletionRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, batch_size, max_due_accounts, started_at, finished_at,
                   due_accounts, deleted_accounts, failed_accounts, deleted_bytes, error_message
            FROM account_deletion_runs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_account_deletion_run).transpose()
    }

    async fn list_account_deletion_items(
        &self,
        run_id: Uuid,
    ) -> DbResult<Vec<AccountDeletionRunItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, user_id, status, deleted_bytes, tenant_results, error_message,
                   created_at
            FROM account_deletion_run_items
            WHERE run_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_account_deletion_item).collect()
    }
}
