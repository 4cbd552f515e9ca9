//! Shared tests for RunRepo implementations

use chrono::Utc;
use uuid::Uuid;

use super::harness::create_test_db;
use crate::{
    db::{DbError, DbPool},
    models::{
        AccountDeletionItemStatus, AccountDeletionRunTotals, NewAccountDeletionRunItem,
        NewRetentionRunItem, RetentionItemOutcome, RetentionRunTotals, RunStatus,
        TenantDeletionResult,
    },
};

pub async fn test_retention_run_lifecycle(db: &DbPool) {
    let run = db.runs().create_retention_run(Utc::now()).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);

    let deleted = vec![Uuid::new_v4(), Uuid::new_v4()];
    db.runs()
        .add_retention_item(
            run.id,
            NewRetentionRunItem {
                tenant_id: Uuid::new_v4(),
                outcome: RetentionItemOutcome::CleanupDone,
                deleted_model_ids: deleted.clone(),
                bytes_freed: 20,
                compliant: true,
                error_message: None,
            },
        )
        .await
        .unwrap();

    let totals = RetentionRunTotals {
        tenants_checked: 1,
        tenants_cleaned: 1,
        models_deleted: 2,
        bytes_freed: 20,
    };
    db.runs()
        .finish_retention_run(run.id, RunStatus::Completed, totals, None, Utc::now())
        .await
        .unwrap();

    let stored = db.runs().get_retention_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.models_deleted, 2);
    assert!(stored.finished_at.is_some());

    let items = db.runs().list_retention_items(run.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].deleted_model_ids, deleted);
    assert!(items[0].compliant);
}

pub async fn test_finish_unknown_run_is_not_found(db: &DbPool) {
    let result = db
        .runs()
        .finish_retention_run(
            Uuid::new_v4(),
            RunStatus::Failed,
            RetentionRunTotals::default(),
            Some("boom".to_string()),
            Utc::now(),
        )
        .await;
    assert!(matches!(result, Err(DbError::NotFound)));
}

pub async fn test_account_deletion_run_lifecycle(db: &DbPool) {
    let run = db
        .runs()
        .create_account_deletion_run(1000, 500, Utc::now())
        .await
        .unwrap();
    assert_eq!(run.batch_size, 1000);

    let tenant_result = TenantDeletionResult {
        tenant_id: Uuid::new_v4(),
        tenant_slug: "workshop".to_string(),
        objects_deleted: 4,
        objects_failed: 0,
        bytes_deleted: 400,
        billing_error: Some("billing timed out".to_string()),
        error: None,
    };
    db.runs()
        .add_account_deletion_item(
            run.id,
            NewAccountDeletionRunItem {
                user_id: Uuid::new_v4(),
                status: AccountDeletionItemStatus::Deleted,
                deleted_bytes: 400,
                tenant_results: vec![tenant_result.clone()],
                error_message: None,
            },
        )
        .await
        .unwrap();

    db.runs()
        .finish_account_deletion_run(
            run.id,
            RunStatus::Completed,
            AccountDeletionRunTotals {
                due_accounts: 1,
                deleted_accounts: 1,
                failed_accounts: 0,
                deleted_bytes: 400,
            },
            None,
            Utc::now(),
        )
        .await
        .unwrap();

    let stored = db
        .runs()
        .get_account_deletion_run(run.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.deleted_bytes, 400);

    let items = db.runs().list_account_deletion_items(run.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, AccountDeletionItemStatus::Deleted);
    assert_eq!(items[0].tenant_results, vec![tenant_result]);
}

mod sqlite_tests {
    use super::*;

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let db = create_test_db().await;
                super::$name(&db).await;
            }
        };
    }

    sqlite_test!(test_retention_run_lifecycle);
    sqlite_test!(test_finish_unknown_run_is_not_found);
    sqlite_test!(test_account_deletion_run_lifecycle);
}
