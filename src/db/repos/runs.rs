use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{
        AccountDeletionRun, AccountDeletionRunItem, AccountDeletionRunTotals,
        NewAccountDeletionRunItem, NewRetentionRunItem, RetentionRun, RetentionRunItem,
        RetentionRunTotals, RunStatus,
    },
};

/// Append-only audit records of sweep runs.
#[async_trait]
pub trait RunRepo: Send + Sync {
    async fn create_retention_run(&self, started_at: DateTime<Utc>) -> DbResult<RetentionRun>;

    async fn add_retention_item(
        &self,
        run_id: Uuid,
        item: NewRetentionRunItem,
    ) -> DbResult<RetentionRunItem>;

    async fn finish_retention_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        totals: RetentionRunTotals,
        error_message: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> DbResult<()>;

    async fn get_retention_run(&self, id: Uuid) -> DbResult<Option<RetentionRun>>;

    async fn list_retention_items(&self, run_id: Uuid) -> DbResult<Vec<RetentionRunItem>>;

    async fn create_account_deletion_run(
        &self,
        batch_size: i64,
        max_due_accounts: i64,
        started_at: DateTime<Utc>,
    ) -> DbResult<AccountDeletionRun>;

    async fn add_account_deletion_item(
        &self,
        run_id: Uuid,
        item: NewAccountDeletionRunItem,
    ) -> DbResult<AccountDeletionRunItem>;

    async fn finish_account_deletion_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        totals: AccountDeletionRunTotals,
        error_message: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> DbResult<()>;

    async fn get_account_deletion_run(&self, id: Uuid) -> DbResult<Option<AccountDeletionRun>>;

    async fn list_account_deletion_items(
        &self,
        run_id: Uuid,
    ) -> DbResult<Vec<AccountDeletionRunItem>>;
}
