//! Shared tests for TenantRepo implementations

use chrono::{Duration, SubsecRound, Utc};

use super::harness::{
    create_test_db, create_test_tenant, create_test_user, free_limits, insert_test_model,
};
use crate::{
    db::{DbError, DbPool},
    models::{CreateTenant, TenantUsage, TierLimits},
};

pub async fn test_create_and_get(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let id = create_test_tenant(db, owner, "workshop", free_limits()).await;

    let tenant = db
        .tenants()
        .get_by_id(id)
        .await
        .expect("Failed to get tenant")
        .expect("Tenant should exist");

    assert_eq!(tenant.slug, "workshop");
    assert_eq!(tenant.owner_id, owner);
    assert_eq!(tenant.limits, free_limits());
    assert_eq!(tenant.cached_model_count, 0);
    assert!(tenant.grace_deadline.is_none());
}

pub async fn test_duplicate_slug_conflicts(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    create_test_tenant(db, owner, "workshop", free_limits()).await;

    let result = db
        .tenants()
        .create(CreateTenant {
            slug: "workshop".to_string(),
            name: "Again".to_string(),
            owner_id: owner,
            tier: "free".to_string(),
            limits: free_limits(),
            billing_customer_id: None,
            billing_subscription_id: None,
        })
        .await;

    assert!(matches!(result, Err(DbError::Conflict(_))));
}

pub async fn test_start_grace_only_once(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let id = create_test_tenant(db, owner, "workshop", free_limits()).await;
    let grace = Utc::now().trunc_subsecs(3) + Duration::days(14);
    let retention = grace + Duration::days(30);

    assert!(db.tenants().start_grace(id, grace, retention).await.unwrap());
    // A second start must not push the deadlines out.
    assert!(
        !db.tenants()
            .start_grace(id, grace + Duration::days(1), retention + Duration::days(1))
            .await
            .unwrap()
    );

    let tenant = db.tenants().get_by_id(id).await.unwrap().unwrap();
    assert_eq!(tenant.grace_deadline, Some(grace));
    assert_eq!(tenant.retention_deadline, Some(retention));

    let in_grace = db.tenants().list_in_grace().await.unwrap();
    assert_eq!(in_grace.len(), 1);

    assert!(db.tenants().clear_grace(id).await.unwrap());
    assert!(!db.tenants().clear_grace(id).await.unwrap());
    let tenant = db.tenants().get_by_id(id).await.unwrap().unwrap();
    assert!(tenant.grace_deadline.is_none());
    assert!(tenant.retention_deadline.is_none());
}

pub async fn test_update_tier(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let id = create_test_tenant(db, owner, "workshop", free_limits()).await;

    let studio = TierLimits {
        max_storage_bytes: 1 << 40,
        max_models: None,
        max_members: 25,
    };
    let tenant = db.tenants().update_tier(id, "studio", studio).await.unwrap();
    assert_eq!(tenant.tier, "studio");
    assert_eq!(tenant.limits, studio);

    let missing = db
        .tenants()
        .update_tier(uuid::Uuid::new_v4(), "studio", studio)
        .await;
    assert!(matches!(missing, Err(DbError::NotFound)));
}

pub async fn test_account_deletion_deadline_mirrors_to_owned_tenants(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let other = create_test_user(db, "other@example.com").await;
    let a = create_test_tenant(db, owner, "a", free_limits()).await;
    let b = create_test_tenant(db, owner, "b", free_limits()).await;
    let c = create_test_tenant(db, other, "c", free_limits()).await;
    let deadline = Utc::now().trunc_subsecs(3) + Duration::days(30);

    let updated = db
        .tenants()
        .set_account_deletion_deadline_for_owner(owner, Some(deadline))
        .await
        .unwrap();
    assert_eq!(updated, 2);

    for id in [a, b] {
        let tenant = db.tenants().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(tenant.account_deletion_deadline, Some(deadline));
    }
    let untouched = db.tenants().get_by_id(c).await.unwrap().unwrap();
    assert!(untouched.account_deletion_deadline.is_none());
}

pub async fn test_refresh_cached_usage(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let id = create_test_tenant(db, owner, "workshop", free_limits()).await;

    db.tenants()
        .refresh_cached_usage(
            id,
            TenantUsage {
                model_count: 3,
                storage_bytes: 42,
            },
        )
        .await
        .unwrap();

    let tenant = db.tenants().get_by_id(id).await.unwrap().unwrap();
    assert_eq!(tenant.cached_model_count, 3);
    assert_eq!(tenant.cached_storage_bytes, 42);
}

pub async fn test_purge_removes_dependents_and_clears_sessions(db: &DbPool) {
    let owner = create_test_user(db, "maker@example.com").await;
    let id = create_test_tenant(db, owner, "workshop", free_limits()).await;
    let keep = create_test_tenant(db, owner, "keep", free_limits()).await;
    insert_test_model(db, id, "Benchy", &[10, 20], Utc::now()).await;
    insert_test_model(db, keep, "Benchy", &[5], Utc::now()).await;
    let session = db.users().create_session(owner, Some(id)).await.unwrap();

    db.tenants().purge(id).await.expect("Failed to purge tenant");

    assert!(db.tenants().get_by_id(id).await.unwrap().is_none());
    let session = db.users().get_session(session.id).await.unwrap().unwrap();
    assert!(session.active_tenant_id.is_none());

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM model_files")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 1);

    assert!(matches!(db.tenants().purge(id).await, Err(DbError::NotFound)));
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

    sqlite_test!(test_create_and_get);
    sqlite_test!(test_duplicate_slug_conflicts);
    sqlite_test!(test_start_grace_only_once);
    sqlite_test!(test_update_tier);
    sqlite_test!(test_account_deletion_deadline_mirrors_to_owned_tenants);
    sqlite_test!(test_refresh_cached_usage);
    sqlite_test!(test_purge_removes_dependents_and_clears_sessions);
}
