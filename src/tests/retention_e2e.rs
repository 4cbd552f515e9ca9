//! Retention enforcement and sweep runs against a real schema and storage.

use bytes::Bytes;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use uuid::Uuid;

use super::harness::{EngineHarness, MB, limits};
use crate::{
    db::tests::harness::{free_limits, insert_test_model},
    models::{RetentionItemOutcome, RunStatus},
    retention::{EnforcementResult, enforce_retention_at, run_retention_sweep_at},
    services::ObjectStorage,
};

/// Put the tenant's grace period and retention window entirely in the past.
async fn expire_grace(h: &EngineHarness, tenant_id: Uuid, now: DateTime<Utc>) {
    let started = h
        .db
        .tenants()
        .start_grace(
            tenant_id,
            now - Duration::days(44),
            now - Duration::days(14),
        )
        .await
        .unwrap();
    assert!(started);
}

/// Insert a model row and write objects for each of its files.
async fn stored_model(
    h: &EngineHarness,
    tenant_id: Uuid,
    name: &str,
    sizes: &[i64],
    created_at: DateTime<Utc>,
) -> (Uuid, Vec<String>) {
    let model = insert_test_model(&h.db, tenant_id, name, sizes, created_at).await;
    let files = h
        .services
        .models
        .get_model(tenant_id, model.id)
        .await
        .unwrap()
        .files;

    let mut keys = Vec::new();
    for file in files {
        h.storage
            .put(
                &file.storage_key,
                Bytes::from(vec![0u8; file.size_bytes as usize]),
                &file.content_type,
                &Default::default(),
            )
            .await
            .unwrap();
        keys.push(file.storage_key);
    }
    (model.id, keys)
}

#[tokio::test]
async fn test_free_tier_over_model_limit_evicts_two_oldest() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", free_limits()).await;
    let now = Utc::now().trunc_subsecs(3);

    let base = now - Duration::days(90);
    let mut ids = Vec::new();
    for (i, name) in ('A'..='L').enumerate() {
        let model = insert_test_model(
            &h.db,
            tenant,
            &name.to_string(),
            &[10 * MB],
            base + Duration::hours(i as i64),
        )
        .await;
        ids.push(model.id);
    }
    expire_grace(&h, tenant, now).await;

    let result = enforce_retention_at(&h.services, tenant, now).await.unwrap();
    assert_eq!(
        result,
        EnforcementResult::CleanupDone {
            deleted_model_ids: vec![ids[0], ids[1]],
            deleted_bytes: 20 * MB,
            compliant: true,
        }
    );

    let usage = h.services.usage.compute_usage(tenant).await.unwrap();
    assert_eq!(usage.model_count, 10);
    assert_eq!(usage.storage_bytes, 100 * MB);

    let row = h.db.tenants().get_by_id(tenant).await.unwrap().unwrap();
    assert!(row.grace_deadline.is_none());
    assert_eq!(row.cached_model_count, 10);
}

#[tokio::test]
async fn test_enforce_retention_is_idempotent() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", limits(150, None)).await;
    let now = Utc::now().trunc_subsecs(3);

    stored_model(&h, tenant, "Old", &[100], now - Duration::days(3)).await;
    stored_model(&h, tenant, "New", &[100], now - Duration::days(1)).await;
    expire_grace(&h, tenant, now).await;

    let first = enforce_retention_at(&h.services, tenant, now).await.unwrap();
    assert!(matches!(first, EnforcementResult::CleanupDone { .. }));

    let usage_after_first = h.services.usage.compute_usage(tenant).await.unwrap();
    let second = enforce_retention_at(&h.services, tenant, now).await.unwrap();
    assert!(
        matches!(
            second,
            EnforcementResult::NoGrace | EnforcementResult::CleanupSkipped
        ),
        "{second:?}"
    );
    assert_eq!(
        h.services.usage.compute_usage(tenant).await.unwrap(),
        usage_after_first
    );
}

#[tokio::test]
async fn test_evicts_only_as_many_as_needed_oldest_first() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", limits(250, None)).await;
    let now = Utc::now().trunc_subsecs(3);

    // Inserted out of order so the creation time, not insertion, decides.
    let (t3, t3_keys) = stored_model(&h, tenant, "T3", &[100], now - Duration::days(1)).await;
    let (t1, t1_keys) = stored_model(&h, tenant, "T1", &[60, 40], now - Duration::days(3)).await;
    let (t2, t2_keys) = stored_model(&h, tenant, "T2", &[100], now - Duration::days(2)).await;
    expire_grace(&h, tenant, now).await;

    let result = enforce_retention_at(&h.services, tenant, now).await.unwrap();
    assert_eq!(
        result,
        EnforcementResult::CleanupDone {
            deleted_model_ids: vec![t1],
            deleted_bytes: 100,
            compliant: true,
        }
    );

    for key in &t1_keys {
        assert!(!h.storage.exists(key).await.unwrap());
    }
    for key in t2_keys.iter().chain(&t3_keys) {
        assert!(h.storage.exists(key).await.unwrap());
    }

    let remaining: Vec<Uuid> = h
        .services
        .models
        .list_models(tenant)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(remaining, vec![t3, t2]);
}

#[tokio::test]
async fn test_partial_storage_failure_still_evicts() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", limits(100, None)).await;
    let now = Utc::now().trunc_subsecs(3);

    let (old, old_keys) = stored_model(&h, tenant, "Old", &[80, 20], now - Duration::days(2)).await;
    stored_model(&h, tenant, "New", &[50], now - Duration::days(1)).await;
    h.storage.fail_delete(&old_keys[0]);
    expire_grace(&h, tenant, now).await;

    let result = enforce_retention_at(&h.services, tenant, now).await.unwrap();
    let EnforcementResult::CleanupDone {
        deleted_model_ids,
        compliant,
        ..
    } = result
    else {
        panic!("expected cleanup");
    };
    assert_eq!(deleted_model_ids, vec![old]);
    assert!(compliant);
    assert!(h.storage.exists(&old_keys[0]).await.unwrap());
    assert!(!h.storage.exists(&old_keys[1]).await.unwrap());
}

#[tokio::test]
async fn test_no_grace_and_within_window_are_no_ops() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let idle = h.tenant(owner, "idle", limits(10, None)).await;
    let waiting = h.tenant(owner, "waiting", limits(10, None)).await;
    let now = Utc::now().trunc_subsecs(3);

    insert_test_model(&h.db, waiting, "Big", &[100], now - Duration::days(5)).await;
    h.db.tenants()
        .start_grace(waiting, now - Duration::days(1), now + Duration::days(29))
        .await
        .unwrap();

    assert_eq!(
        enforce_retention_at(&h.services, idle, now).await.unwrap(),
        EnforcementResult::NoGrace
    );
    assert_eq!(
        enforce_retention_at(&h.services, waiting, now).await.unwrap(),
        EnforcementResult::WithinRetentionWindow
    );
    assert_eq!(
        h.services.usage.compute_usage(waiting).await.unwrap().model_count,
        1
    );
}

#[tokio::test]
async fn test_already_compliant_clears_grace_without_deleting() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let tenant = h.tenant(owner, "workshop", limits(1000, None)).await;
    let now = Utc::now().trunc_subsecs(3);

    insert_test_model(&h.db, tenant, "Fits", &[10], now - Duration::days(5)).await;
    expire_grace(&h, tenant, now).await;

    assert_eq!(
        enforce_retention_at(&h.services, tenant, now).await.unwrap(),
        EnforcementResult::CleanupSkipped
    );
    let row = h.db.tenants().get_by_id(tenant).await.unwrap().unwrap();
    assert!(row.grace_deadline.is_none());
    assert!(row.retention_deadline.is_none());
    assert_eq!(h.services.usage.compute_usage(tenant).await.unwrap().model_count, 1);
}

#[tokio::test]
async fn test_sweep_records_one_item_per_tenant_in_grace() {
    let h = EngineHarness::new().await;
    let owner = h.user("maker@example.com").await;
    let now = Utc::now().trunc_subsecs(3);

    let evictable = h.tenant(owner, "evictable", limits(100, None)).await;
    insert_test_model(&h.db, evictable, "Old", &[70], now - Duration::days(2)).await;
    insert_test_model(&h.db, evictable, "New", &[70], now - Duration::days(1)).await;
    expire_grace(&h, evictable, now).await;

    let waiting = h.tenant(owner, "waiting", limits(100, None)).await;
    insert_test_model(&h.db, waiting, "Big", &[500], now - Duration::days(1)).await;
    h.db.tenants()
        .start_grace(waiting, now + Duration::days(1), now + Duration::days(31))
        .await
        .unwrap();

    let healed = h.tenant(owner, "healed", limits(100, None)).await;
    expire_grace(&h, healed, now).await;

    // Never in grace; not part of the sweep.
    h.tenant(owner, "idle", limits(100, None)).await;

    let run = run_retention_sweep_at(&h.services, now).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.tenants_checked, 3);
    assert_eq!(run.tenants_cleaned, 2);
    assert_eq!(run.models_deleted, 1);
    assert_eq!(run.bytes_freed, 70);
    assert!(run.finished_at.is_some());

    let stored = h.db.runs().get_retention_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.bytes_freed, 70);

    let items = h.db.runs().list_retention_items(run.id).await.unwrap();
    assert_eq!(items.len(), 3);
    let outcome_of = |tenant_id: Uuid| {
        items
            .iter()
            .find(|i| i.tenant_id == tenant_id)
            .map(|i| i.outcome)
            .unwrap()
    };
    assert_eq!(outcome_of(evictable), RetentionItemOutcome::CleanupDone);
    assert_eq!(outcome_of(waiting), RetentionItemOutcome::WithinRetentionWindow);
    assert_eq!(outcome_of(healed), RetentionItemOutcome::CleanupSkipped);

    let done = items.iter().find(|i| i.tenant_id == evictable).unwrap();
    assert_eq!(done.deleted_model_ids.len(), 1);
    assert!(done.compliant);

    // A second sweep only sees the tenant still waiting out its window.
    let again = run_retention_sweep_at(&h.services, now).await.unwrap();
    assert_eq!(again.tenants_checked, 1);
    assert_eq!(again.models_deleted, 0);
}
