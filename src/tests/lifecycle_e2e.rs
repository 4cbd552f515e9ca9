//! Model lifecycle, usage accounting and the write guard, end to end.

use chrono::{Duration, Utc};
use rstest::rstest;

use super::harness::{EngineHarness, MB, limits, roomy_limits};
use crate::{
    config::PrintshelfConfig,
    jobs::schedule_account_deletion,
    models::tenant_storage_prefix,
    services::{
        GraceTransition, ModelServiceError, ObjectStorage, ObjectStorageError, WriteBlocked,
    },
};

#[tokio::test]
async fn test_create_model_stores_objects_then_rows() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;

    let model = h.upload(tenant, owner, "Benchy", &[100, 250]).await.unwrap();
    assert_eq!(model.slug, "benchy");

    let stored = h.services.models.get_model(tenant, model.id).await.unwrap();
    assert_eq!(stored.files.len(), 2);
    assert_eq!(stored.total_size_bytes(), 350);
    assert_eq!(stored.model.tags, vec!["test".to_string()]);

    for file in &stored.files {
        assert!(h.storage.exists(&file.storage_key).await.unwrap());
        assert!(file.storage_key.starts_with(&tenant_storage_prefix(tenant)));
        assert!(file.storage_key.ends_with(".stl"));
        assert_eq!(file.content_hash.len(), 64);
    }

    let tenant_row = h.db.tenants().get_by_id(tenant).await.unwrap().unwrap();
    assert_eq!(tenant_row.cached_model_count, 1);
    assert_eq!(tenant_row.cached_storage_bytes, 350);
}

#[tokio::test]
async fn test_slug_conflict_leaves_no_objects_from_failed_call() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;
    let prefix = tenant_storage_prefix(tenant);

    h.upload(tenant, owner, "Benchy", &[10]).await.unwrap();
    let before = h.storage.keys_under(&prefix).await;
    assert_eq!(before.len(), 1);

    let err = h
        .upload(tenant, owner, "benchy!", &[20, 30, 40])
        .await
        .unwrap_err();
    assert!(matches!(err, ModelServiceError::Conflict(_)), "{err:?}");

    assert_eq!(h.storage.keys_under(&prefix).await, before);
    assert_eq!(h.services.models.list_models(tenant).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_upload_partway_is_compensated() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;

    h.storage.fail_puts_after(2);
    let err = h
        .upload(tenant, owner, "Calibration Cube", &[10, 20, 30])
        .await
        .unwrap_err();
    assert!(matches!(err, ModelServiceError::Storage(_)), "{err:?}");

    assert!(
        h.storage
            .keys_under(&tenant_storage_prefix(tenant))
            .await
            .is_empty()
    );
    assert!(h.services.models.list_models(tenant).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_timed_out_upload_is_compensated() {
    let mut config = PrintshelfConfig::default();
    config.storage.request_timeout_secs = 1;
    let h = EngineHarness::with_config(config).await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;

    // The object lands in storage but the call outlives its deadline.
    h.storage.stall_puts(std::time::Duration::from_secs(3));
    let err = h
        .upload(tenant, owner, "Slow Benchy", &[10, 20])
        .await
        .unwrap_err();
    assert!(
        matches!(err, ModelServiceError::Storage(ObjectStorageError::Timeout(_))),
        "{err:?}"
    );

    assert!(
        h.storage
            .keys_under(&tenant_storage_prefix(tenant))
            .await
            .is_empty()
    );
    assert!(h.services.models.list_models(tenant).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_that_stays_over_limit_keeps_grace() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", limits(100, None)).await;
    let now = Utc::now();

    let keep = crate::db::tests::harness::insert_test_model(&h.db, tenant, "Big", &[150], now).await;
    let small =
        crate::db::tests::harness::insert_test_model(&h.db, tenant, "Small", &[10], now).await;
    assert!(matches!(
        h.services.grace.check_usage(tenant).await.unwrap(),
        GraceTransition::Entered { .. }
    ));
    let before = h.db.tenants().get_by_id(tenant).await.unwrap().unwrap();

    h.services.models.delete_model(tenant, small.id).await.unwrap();

    let after = h.db.tenants().get_by_id(tenant).await.unwrap().unwrap();
    assert_eq!(after.grace_deadline, before.grace_deadline);
    assert_eq!(after.retention_deadline, before.retention_deadline);
    assert!(h.services.models.get_model(tenant, keep.id).await.is_ok());
}

#[rstest]
#[case::no_files(&[])]
#[case::empty_file(&[0])]
#[tokio::test]
async fn test_invalid_input_persists_nothing(#[case] sizes: &[usize]) {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;

    let err = h.upload(tenant, owner, "Benchy", sizes).await.unwrap_err();
    assert!(matches!(err, ModelServiceError::Validation(_)), "{err:?}");
    assert!(
        h.storage
            .keys_under(&tenant_storage_prefix(tenant))
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn test_quota_exceeded_before_any_write() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", limits(1000, Some(2))).await;

    h.upload(tenant, owner, "First", &[600]).await.unwrap();

    let err = h.upload(tenant, owner, "Second", &[401]).await.unwrap_err();
    assert!(
        matches!(
            err,
            ModelServiceError::QuotaExceeded {
                current_models: 1,
                current_bytes: 600,
                incoming_bytes: 401,
                ..
            }
        ),
        "{err:?}"
    );
    assert_eq!(
        h.storage
            .keys_under(&tenant_storage_prefix(tenant))
            .await
            .len(),
        1
    );

    h.upload(tenant, owner, "Second", &[400]).await.unwrap();
}

#[tokio::test]
async fn test_usage_matches_sum_of_live_files() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;

    let a = h.upload(tenant, owner, "A", &[100, 200]).await.unwrap();
    h.upload(tenant, owner, "B", &[300]).await.unwrap();
    let c = h.upload(tenant, owner, "C", &[50, 50, 50]).await.unwrap();
    h.upload(tenant, owner, "D", &[7]).await.unwrap();

    h.services.models.delete_model(tenant, a.id).await.unwrap();
    h.services
        .models
        .evict_model(tenant, c.id, Utc::now())
        .await
        .unwrap();

    let mut live_bytes = 0;
    let live = h.services.models.list_models(tenant).await.unwrap();
    for model in &live {
        live_bytes += h
            .services
            .models
            .get_model(tenant, model.id)
            .await
            .unwrap()
            .total_size_bytes();
    }

    let usage = h.services.usage.compute_usage(tenant).await.unwrap();
    assert_eq!(usage.model_count, live.len() as i64);
    assert_eq!(usage.storage_bytes, live_bytes);
    assert_eq!(usage.storage_bytes, 307);
}

#[tokio::test]
async fn test_delete_is_scoped_to_tenant() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;
    let other = h.tenant(owner, "other", roomy_limits()).await;

    let model = h.upload(tenant, owner, "Benchy", &[10]).await.unwrap();

    let err = h
        .services
        .models
        .delete_model(other, model.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ModelServiceError::ModelNotFound(_)));

    let deleted = h.services.models.delete_model(tenant, model.id).await.unwrap();
    assert_eq!(deleted.size_bytes, 10);

    let err = h
        .services
        .models
        .delete_model(tenant, model.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ModelServiceError::ModelNotFound(_)));
}

#[tokio::test]
async fn test_account_deletion_message_wins_over_grace() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;
    let now = Utc::now();

    h.db.tenants()
        .start_grace(tenant, now + Duration::days(3), now + Duration::days(30))
        .await
        .unwrap();
    schedule_account_deletion(&h.services, owner, now + Duration::days(7))
        .await
        .unwrap();

    let err = h.upload(tenant, owner, "Benchy", &[10]).await.unwrap_err();
    let blocked = match err {
        ModelServiceError::WriteBlocked(blocked) => blocked,
        other => panic!("expected write to be blocked, got {other:?}"),
    };
    assert!(matches!(
        blocked,
        WriteBlocked::AccountDeletionScheduled { .. }
    ));
    assert!(blocked.to_string().contains("scheduled for deletion"));
}

#[tokio::test]
async fn test_downgrade_enters_grace_and_self_heal_clears_it() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", roomy_limits()).await;

    let mut ids = Vec::new();
    for name in ["One", "Two", "Three"] {
        ids.push(h.upload(tenant, owner, name, &[MB as usize]).await.unwrap().id);
    }

    // The default free tier allows 500 MiB, so shrink it via a custom tier.
    let mut config = h.config.clone();
    config.tiers = [("tiny".to_string(), limits(2 * MB, Some(10)))]
        .into_iter()
        .collect();
    let grace = crate::services::GraceService::new(
        h.db.clone(),
        h.services.usage.clone(),
        config.retention.clone(),
        config.tiers.clone(),
    );

    let (downgraded, transition) = grace.change_tier(tenant, "tiny").await.unwrap();
    assert_eq!(downgraded.tier, "tiny");
    let GraceTransition::Entered {
        grace_deadline,
        retention_deadline,
    } = transition
    else {
        panic!("expected grace to start, got {transition:?}");
    };
    assert_eq!(
        retention_deadline - grace_deadline,
        config.retention.retention_period()
    );

    // Uploads are blocked but reads and deletes are not.
    let err = h.upload(tenant, owner, "Four", &[10]).await.unwrap_err();
    assert!(matches!(
        err,
        ModelServiceError::WriteBlocked(WriteBlocked::OverLimit { .. })
    ));
    let listed = h.services.models.list_models(tenant).await.unwrap();
    assert_eq!(listed.len(), 3);
    let first = h.services.models.get_model(tenant, ids[0]).await.unwrap();
    let url = h
        .services
        .models
        .download_url(tenant, first.files[0].id, 15)
        .await
        .unwrap();
    assert!(url.ends_with(&first.files[0].storage_key));

    // Deleting back under the limits lifts the block without waiting for a scheduled check.
    h.services.models.delete_model(tenant, ids[0]).await.unwrap();
    let cleared = h.db.tenants().get_by_id(tenant).await.unwrap().unwrap();
    assert!(cleared.grace_deadline.is_none());
    assert!(cleared.retention_deadline.is_none());
    assert_eq!(cleared.cached_storage_bytes, 2 * MB);
    assert_eq!(
        grace.check_usage(tenant).await.unwrap(),
        GraceTransition::Unchanged
    );

    // Going over again starts a fresh grace period.
    let err = h.upload(tenant, owner, "Four", &[10]).await.unwrap_err();
    assert!(matches!(err, ModelServiceError::QuotaExceeded { .. }), "{err:?}");
    crate::db::tests::harness::insert_test_model(&h.db, tenant, "Five", &[MB], Utc::now()).await;
    assert!(matches!(
        grace.check_usage(tenant).await.unwrap(),
        GraceTransition::Entered { .. }
    ));
}

#[tokio::test]
async fn test_check_all_tenants_summary() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let over = h.tenant(owner, "over", limits(100, None)).await;
    let fine = h.tenant(owner, "fine", limits(100, None)).await;

    crate::db::tests::harness::insert_test_model(&h.db, over, "Big", &[101], Utc::now()).await;
    crate::db::tests::harness::insert_test_model(&h.db, fine, "Small", &[99], Utc::now()).await;

    let summary = h.services.grace.check_all_tenants().await.unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.entered, 1);
    assert_eq!(summary.cleared, 0);
    assert_eq!(summary.failed, 0);

    let over = h.db.tenants().get_by_id(over).await.unwrap().unwrap();
    assert!(over.grace_deadline.is_some());
    assert_eq!(over.cached_storage_bytes, 101);
}
