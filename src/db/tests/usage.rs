//! Shared tests for UsageRepo implementations

use chrono::Utc;

use super::harness::{
    create_test_db, create_test_tenant, create_test_user, free_limits, insert_test_model,
};
use crate::{db::DbPool, models::TenantUsage};

pub async fn test_empty_tenant_has_zero_usage(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let tenant_id = create_test_tenant(db, owner, "workshop", free_limits()).await;

    let usage = db.usage().compute_usage(tenant_id).await.unwrap();
    assert_eq!(usage, TenantUsage::default());
}

pub async fn test_usage_ignores_deleted_models_and_other_tenants(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let tenant_id = create_test_tenant(db, owner, "workshop", free_limits()).await;
    let other = create_test_tenant(db, owner, "other", free_limits()).await;

    insert_test_model(db, tenant_id, "A", &[100, 50], Utc::now()).await;
    let b = insert_test_model(db, tenant_id, "B", &[30], Utc::now()).await;
    insert_test_model(db, other, "C", &[1_000], Utc::now()).await;

    let footprint = db.models().footprint(tenant_id, b.id).await.unwrap().unwrap();
    db.models().soft_delete(&footprint, Utc::now()).await.unwrap();

    let usage = db.usage().compute_usage(tenant_id).await.unwrap();
    assert_eq!(
        usage,
        TenantUsage {
            model_count: 1,
            storage_bytes: 150,
        }
    );
}

pub async fn test_usage_does_not_read_cached_counters(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let tenant_id = create_test_tenant(db, owner, "workshop", free_limits()).await;
    insert_test_model(db, tenant_id, "A", &[64], Utc::now()).await;

    db.tenants()
        .refresh_cached_usage(
            tenant_id,
            TenantUsage {
                model_count: 999,
                storage_bytes: 999_999,
            },
        )
        .await
        .unwrap();

    let usage = db.usage().compute_usage(tenant_id).await.unwrap();
    assert_eq!(usage.model_count, 1);
    assert_eq!(usage.storage_bytes, 64);
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

    sqlite_test!(test_empty_tenant_has_zero_usage);
    sqlite_test!(test_usage_ignores_deleted_models_and_other_tenants);
    sqlite_test!(test_usage_does_not_read_cached_counters);
}
