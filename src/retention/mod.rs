//! Retention enforcement for tenants that stayed over their limits.
//!
//! Once a tenant's retention deadline has passed, its models are evicted
//! oldest first until usage fits the tier again or nothing is left:
//! 1. Storage objects of the candidate are deleted
//! 2. The model row is soft-deleted
//!
//! The sweep in [`run_retention_sweep`] records one audit item per tenant.

mod worker;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;
pub use worker::{run_retention_sweep, run_retention_sweep_at, start_retention_worker};

use crate::{
    db::DbError,
    models::{NewRetentionRunItem, RetentionItemOutcome},
    observability::metrics,
    services::{GraceState, Services},
};

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),
}

pub type RetentionResult<T> = Result<T, RetentionError>;

/// What enforcing retention did to one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementResult {
    /// No grace deadline is set.
    NoGrace,
    /// The retention deadline has not passed yet.
    WithinRetentionWindow,
    /// Usage already fit the tier; grace was cleared without deleting anything.
    CleanupSkipped,
    CleanupDone {
        deleted_model_ids: Vec<Uuid>,
        deleted_bytes: i64,
        /// Whether the tenant fits its tier after eviction.
        compliant: bool,
    },
}

impl EnforcementResult {
    pub fn outcome(&self) -> RetentionItemOutcome {
        match self {
            EnforcementResult::NoGrace => RetentionItemOutcome::NoGrace,
            EnforcementResult::WithinRetentionWindow => {
                RetentionItemOutcome::WithinRetentionWindow
            }
            EnforcementResult::CleanupSkipped => RetentionItemOutcome::CleanupSkipped,
            EnforcementResult::CleanupDone { .. } => RetentionItemOutcome::CleanupDone,
        }
    }

    pub(crate) fn into_item(self, tenant_id: Uuid) -> NewRetentionRunItem {
        let outcome = self.outcome();
        match self {
            EnforcementResult::CleanupDone {
                deleted_model_ids,
                deleted_bytes,
                compliant,
            } => NewRetentionRunItem {
                tenant_id,
                outcome,
                deleted_model_ids,
                bytes_freed: deleted_bytes,
                compliant,
                error_message: None,
            },
            _ => NewRetentionRunItem {
                tenant_id,
                outcome,
                deleted_model_ids: Vec::new(),
                bytes_freed: 0,
                compliant: !matches!(outcome, RetentionItemOutcome::WithinRetentionWindow),
                error_message: None,
            },
        }
    }
}

/// Enforce retention on one tenant as of now.
pub async fn enforce_retention(
    services: &Services,
    tenant_id: Uuid,
) -> RetentionResult<EnforcementResult> {
    enforce_retention_at(services, tenant_id, Utc::now()).await
}

/// Enforce retention on one tenant as of `now`.
///
/// Idempotent: once a tenant is compliant again its grace deadline is
/// cleared, so a repeated call returns `NoGrace`.
#[instrument(skip(services))]
pub async fn enforce_retention_at(
    services: &Services,
    tenant_id: Uuid,
    now: DateTime<Utc>,
) -> RetentionResult<EnforcementResult> {
    let tenant = services
        .db
        .tenants()
        .get_by_id(tenant_id)
        .await?
        .ok_or(RetentionError::TenantNotFound(tenant_id))?;

    match GraceState::evaluate(&tenant, now) {
        GraceState::Compliant => return Ok(EnforcementResult::NoGrace),
        GraceState::InGrace { .. } => return Ok(EnforcementResult::WithinRetentionWindow),
        GraceState::Evicted { .. } => {}
    }

    let usage = services.usage.compute_usage(tenant_id).await?;
    if !usage.exceeds(&tenant.limits) {
        services.db.tenants().clear_grace(tenant_id).await?;
        info!(tenant_id = %tenant_id, "Tenant already compliant, grace cleared");
        return Ok(EnforcementResult::CleanupSkipped);
    }

    let candidates = services
        .db
        .models()
        .list_eviction_candidates(tenant_id)
        .await?;

    // Local estimate, only used to decide when to stop.
    let mut running = usage;
    let mut deleted_model_ids = Vec::new();
    let mut deleted_bytes = 0i64;

    for candidate in candidates {
        if !running.exceeds(&tenant.limits) {
            break;
        }

        match services
            .models
            .evict_model(tenant_id, candidate.model_id, now)
            .await
        {
            Ok(evicted) => {
                let bytes = evicted.footprint.size_bytes;
                running.model_count -= 1;
                running.storage_bytes -= bytes;
                deleted_bytes += bytes;
                deleted_model_ids.push(candidate.model_id);
                metrics::record_eviction(bytes);

                info!(
                    tenant_id = %tenant_id,
                    model_id = %candidate.model_id,
                    model_created_at = %candidate.created_at,
                    bytes,
                    objects_failed = evicted.storage.failed.len(),
                    "Evicted model"
                );
            }
            Err(e) => {
                warn!(
                    tenant_id = %tenant_id,
                    model_id = %candidate.model_id,
                    error = %e,
                    "Failed to evict model, skipping"
                );
            }
        }
    }

    let after = services.usage.refresh_cached(tenant_id).await?;
    let compliant = !after.exceeds(&tenant.limits);
    if compliant {
        services.db.tenants().clear_grace(tenant_id).await?;
    }

    info!(
        tenant_id = %tenant_id,
        models_deleted = deleted_model_ids.len(),
        deleted_bytes,
        compliant,
        "Retention enforced"
    );

    Ok(EnforcementResult::CleanupDone {
        deleted_model_ids,
        deleted_bytes,
        compliant,
    })
}
