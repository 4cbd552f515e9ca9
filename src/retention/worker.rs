//! Retention sweep runs and the background worker that repeats them.

use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use super::{EnforcementResult, RetentionResult, enforce_retention_at};
use crate::{
    config::RetentionConfig,
    models::{
        NewRetentionRunItem, RetentionItemOutcome, RetentionRun, RetentionRunTotals, RunStatus,
    },
    observability::metrics,
    services::Services,
};

/// Run one audited retention sweep over every tenant with a grace deadline.
pub async fn run_retention_sweep(services: &Services) -> RetentionResult<RetentionRun> {
    run_retention_sweep_at(services, Utc::now()).await
}

/// Run one audited retention sweep as of `now`.
///
/// Failing to create the run record is returned as an error. Anything that
/// goes wrong afterwards is recorded on the run, which is then returned with
/// status `failed`.
pub async fn run_retention_sweep_at(
    services: &Services,
    now: DateTime<Utc>,
) -> RetentionResult<RetentionRun> {
    let started = Instant::now();
    let mut run = services
        .db
        .runs()
        .create_retention_run(now.trunc_subsecs(3))
        .await?;

    tracing::info!(run_id = %run.id, "Retention sweep started");

    let mut totals = RetentionRunTotals::default();
    let result = process_tenants(services, run.id, now, &mut totals).await;

    let (status, error_message) = match result {
        Ok(()) => (RunStatus::Completed, None),
        Err(e) => {
            tracing::error!(run_id = %run.id, error = %e, "Retention sweep failed");
            (RunStatus::Failed, Some(e.to_string()))
        }
    };

    let finished_at = Utc::now().trunc_subsecs(3);
    services
        .db
        .runs()
        .finish_retention_run(run.id, status, totals, error_message.clone(), finished_at)
        .await?;

    run.status = status;
    run.finished_at = Some(finished_at);
    run.tenants_checked = totals.tenants_checked;
    run.tenants_cleaned = totals.tenants_cleaned;
    run.models_deleted = totals.models_deleted;
    run.bytes_freed = totals.bytes_freed;
    run.error_message = error_message;

    metrics::record_sweep_run("retention", status.as_str(), started.elapsed().as_secs_f64());
    tracing::info!(
        run_id = %run.id,
        status = %status,
        tenants_checked = totals.tenants_checked,
        tenants_cleaned = totals.tenants_cleaned,
        models_deleted = totals.models_deleted,
        bytes_freed = totals.bytes_freed,
        "Retention sweep finished"
    );

    Ok(run)
}

/// Tenants are processed strictly one after another.
async fn process_tenants(
    services: &Services,
    run_id: Uuid,
    now: DateTime<Utc>,
    totals: &mut RetentionRunTotals,
) -> RetentionResult<()> {
    let tenants = services.db.tenants().list_in_grace().await?;

    for tenant in tenants {
        totals.tenants_checked += 1;

        let item = match enforce_retention_at(services, tenant.id, now).await {
            Ok(result) => {
                if let EnforcementResult::CleanupDone {
                    deleted_model_ids,
                    deleted_bytes,
                    ..
                } = &result
                {
                    totals.models_deleted += deleted_model_ids.len() as i64;
                    totals.bytes_freed += deleted_bytes;
                }
                if matches!(
                    result,
                    EnforcementResult::CleanupDone { .. } | EnforcementResult::CleanupSkipped
                ) {
                    totals.tenants_cleaned += 1;
                }
                result.into_item(tenant.id)
            }
            Err(e) => {
                tracing::warn!(tenant_id = %tenant.id, error = %e, "Retention enforcement failed");
                NewRetentionRunItem {
                    tenant_id: tenant.id,
                    outcome: RetentionItemOutcome::Failed,
                    deleted_model_ids: Vec::new(),
                    bytes_freed: 0,
                    compliant: false,
                    error_message: Some(e.to_string()),
                }
            }
        };

        services.db.runs().add_retention_item(run_id, item).await?;
    }

    Ok(())
}

/// Starts the retention worker as a background task.
///
/// Each pass runs the scheduled usage check over every tenant (starting or
/// clearing grace periods) and then a retention sweep. It runs until the task
/// is cancelled.
pub async fn start_retention_worker(services: Services, config: RetentionConfig) {
    tracing::info!(
        interval_hours = config.interval_hours,
        grace_period_days = config.grace_period_days,
        retention_period_days = config.retention_period_days,
        "Starting retention worker"
    );

    let interval = config.interval();

    loop {
        match services.grace.check_all_tenants().await {
            Ok(summary) => tracing::info!(
                checked = summary.checked,
                entered = summary.entered,
                cleared = summary.cleared,
                failed = summary.failed,
                "Usage check complete"
            ),
            Err(e) => tracing::error!(error = %e, "Error running usage check"),
        }

        match run_retention_sweep(&services).await {
            Ok(run) if run.status == RunStatus::Failed => {
                tracing::warn!(run_id = %run.id, "Retention run recorded as failed");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Error running retention sweep");
            }
        }

        tokio::time::sleep(interval).await;
    }
}
