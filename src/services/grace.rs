//! Grace period state machine and write guard.
//!
//! A tenant found over its tier limits gets two deadlines at once:
//!
//! - `grace_deadline = now + grace_period`: uploads are blocked, nothing is deleted.
//! - `retention_deadline = grace_deadline + retention_period`: after this the
//!   retention sweep evicts the oldest models.
//!
//! Any usage check that finds the tenant back under its limits clears both.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::UsageService;
use crate::{
    config::{RetentionConfig, TiersConfig},
    db::{DbError, DbPool},
    models::{Tenant, TenantUsage},
};

#[derive(Debug, Error)]
pub enum GraceError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Tenant not found: {0}")]
    TenantNotFound(Uuid),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),
}

pub type GraceResult<T> = Result<T, GraceError>;

/// Where a tenant stands relative to its deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceState {
    Compliant,
    InGrace {
        grace_deadline: DateTime<Utc>,
        retention_deadline: DateTime<Utc>,
    },
    /// Retention window elapsed; the sweep may evict.
    Evicted {
        grace_deadline: DateTime<Utc>,
        retention_deadline: DateTime<Utc>,
    },
}

impl GraceState {
    pub fn evaluate(tenant: &Tenant, now: DateTime<Utc>) -> Self {
        let Some(grace_deadline) = tenant.grace_deadline else {
            return GraceState::Compliant;
        };
        let retention_deadline = tenant.retention_deadline.unwrap_or(grace_deadline);

        if now > retention_deadline {
            GraceState::Evicted {
                grace_deadline,
                retention_deadline,
            }
        } else {
            GraceState::InGrace {
                grace_deadline,
                retention_deadline,
            }
        }
    }
}

/// Outcome of a usage check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceTransition {
    Entered {
        grace_deadline: DateTime<Utc>,
        retention_deadline: DateTime<Utc>,
    },
    Cleared,
    Unchanged,
}

/// Why a content-adding write was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteBlocked {
    #[error(
        "This account is scheduled for deletion on {deadline}. Cancel the deletion to upload again."
    )]
    AccountDeletionScheduled { deadline: DateTime<Utc> },

    #[error(
        "Storage limits exceeded. Delete models or upgrade before {grace_deadline} to upload again."
    )]
    OverLimit { grace_deadline: DateTime<Utc> },

    #[error(
        "Grace period has ended. The oldest models will be removed after {retention_deadline} until usage fits the plan."
    )]
    GraceExpired { retention_deadline: DateTime<Utc> },
}

/// Refuse content-adding writes while any deadline is pending.
///
/// A pending account deletion always wins over grace messaging.
pub fn check_write_allowed(tenant: &Tenant, now: DateTime<Utc>) -> Result<(), WriteBlocked> {
    if let Some(deadline) = tenant.account_deletion_deadline {
        return Err(WriteBlocked::AccountDeletionScheduled { deadline });
    }

    match tenant.grace_deadline {
        None => Ok(()),
        Some(grace_deadline) if now <= grace_deadline => {
            Err(WriteBlocked::OverLimit { grace_deadline })
        }
        Some(grace_deadline) => Err(WriteBlocked::GraceExpired {
            retention_deadline: tenant.retention_deadline.unwrap_or(grace_deadline),
        }),
    }
}

/// Totals from a scheduled pass over every tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCheckSummary {
    pub checked: u64,
    pub entered: u64,
    pub cleared: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct GraceService {
    db: Arc<DbPool>,
    usage: UsageService,
    retention: RetentionConfig,
    tiers: TiersConfig,
}

impl GraceService {
    pub fn new(
        db: Arc<DbPool>,
        usage: UsageService,
        retention: RetentionConfig,
        tiers: TiersConfig,
    ) -> Self {
        Self {
            db,
            usage,
            retention,
            tiers,
        }
    }

    async fn tenant(&self, tenant_id: Uuid) -> GraceResult<Tenant> {
        self.db
            .tenants()
            .get_by_id(tenant_id)
            .await?
            .ok_or(GraceError::TenantNotFound(tenant_id))
    }

    /// Recompute usage and move the tenant into or out of grace.
    pub async fn check_usage(&self, tenant_id: Uuid) -> GraceResult<GraceTransition> {
        self.check_usage_at(tenant_id, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn check_usage_at(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> GraceResult<GraceTransition> {
        let tenant = self.tenant(tenant_id).await?;
        let usage = self.usage.refresh_cached(tenant_id).await?;
        self.apply_usage(&tenant, usage, now).await
    }

    async fn apply_usage(
        &self,
        tenant: &Tenant,
        usage: TenantUsage,
        now: DateTime<Utc>,
    ) -> GraceResult<GraceTransition> {
        let over_limit = usage.exceeds(&tenant.limits);

        match (over_limit, tenant.grace_deadline) {
            (true, None) => {
                let grace_deadline = now.trunc_subsecs(3) + self.retention.grace_period();
                let retention_deadline = grace_deadline + self.retention.retention_period();

                let started = self
                    .db
                    .tenants()
                    .start_grace(tenant.id, grace_deadline, retention_deadline)
                    .await?;
                if !started {
                    // Someone else started grace first.
                    return Ok(GraceTransition::Unchanged);
                }

                info!(
                    tenant_id = %tenant.id,
                    storage_bytes = usage.storage_bytes,
                    model_count = usage.model_count,
                    grace_deadline = %grace_deadline,
                    retention_deadline = %retention_deadline,
                    "Tenant over limits, grace period started"
                );
                Ok(GraceTransition::Entered {
                    grace_deadline,
                    retention_deadline,
                })
            }
            (false, Some(_)) => {
                let cleared = self.db.tenants().clear_grace(tenant.id).await?;
                if cleared {
                    info!(tenant_id = %tenant.id, "Tenant back within limits, grace cleared");
                    Ok(GraceTransition::Cleared)
                } else {
                    Ok(GraceTransition::Unchanged)
                }
            }
            _ => Ok(GraceTransition::Unchanged),
        }
    }

    /// Switch a tenant to another configured tier, then re-check usage.
    #[instrument(skip(self))]
    pub async fn change_tier(
        &self,
        tenant_id: Uuid,
        tier: &str,
    ) -> GraceResult<(Tenant, GraceTransition)> {
        let limits = *self
            .tiers
            .get(tier)
            .ok_or_else(|| GraceError::UnknownTier(tier.to_string()))?;

        self.db
            .tenants()
            .update_tier(tenant_id, tier, limits)
            .await
            .map_err(|e| match e {
                DbError::NotFound => GraceError::TenantNotFound(tenant_id),
                other => other.into(),
            })?;

        let transition = self.check_usage(tenant_id).await?;
        let tenant = self.tenant(tenant_id).await?;
        Ok((tenant, transition))
    }

    /// Scheduled usage check over every tenant. Per-tenant failures are
    /// logged and counted.
    pub async fn check_all_tenants(&self) -> GraceResult<UsageCheckSummary> {
        let now = Utc::now();
        let mut summary = UsageCheckSummary::default();

        for tenant in self.db.tenants().list_all().await? {
            summary.checked += 1;
            let result = match self.usage.refresh_cached(tenant.id).await {
                Ok(usage) => self.apply_usage(&tenant, usage, now).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(GraceTransition::Entered { .. }) => summary.entered += 1,
                Ok(GraceTransition::Cleared) => summary.cleared += 1,
                Ok(GraceTransition::Unchanged) => {}
                Err(e) => {
                    warn!(tenant_id = %tenant.id, error = %e, "Usage check failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::TierLimits;

    fn tenant() -> Tenant {
        let now = Utc::now();
        Tenant {
            id: Uuid::new_v4(),
            slug: "workshop".to_string(),
            name: "Workshop".to_string(),
            owner_id: Uuid::new_v4(),
            tier: "free".to_string(),
            limits: TierLimits {
                max_storage_bytes: 100,
                max_models: Some(10),
                max_members: 1,
            },
            cached_model_count: 0,
            cached_storage_bytes: 0,
            grace_deadline: None,
            retention_deadline: None,
            account_deletion_deadline: None,
            billing_customer_id: None,
            billing_subscription_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_evaluate_states() {
        let now = Utc::now();
        let mut t = tenant();
        assert_eq!(GraceState::evaluate(&t, now), GraceState::Compliant);

        t.grace_deadline = Some(now + Duration::days(1));
        t.retention_deadline = Some(now + Duration::days(2));
        assert!(matches!(
            GraceState::evaluate(&t, now),
            GraceState::InGrace { .. }
        ));

        // Past grace but inside retention is still not evictable.
        assert!(matches!(
            GraceState::evaluate(&t, now + Duration::hours(36)),
            GraceState::InGrace { .. }
        ));
        assert!(matches!(
            GraceState::evaluate(&t, now + Duration::days(3)),
            GraceState::Evicted { .. }
        ));
    }

    #[test]
    fn test_write_allowed_when_compliant() {
        assert!(check_write_allowed(&tenant(), Utc::now()).is_ok());
    }

    #[test]
    fn test_write_blocked_messages() {
        let now = Utc::now();
        let mut t = tenant();
        t.grace_deadline = Some(now + Duration::days(1));
        t.retention_deadline = Some(now + Duration::days(2));

        assert!(matches!(
            check_write_allowed(&t, now),
            Err(WriteBlocked::OverLimit { .. })
        ));
        assert!(matches!(
            check_write_allowed(&t, now + Duration::hours(30)),
            Err(WriteBlocked::GraceExpired { .. })
        ));
    }

    #[test]
    fn test_account_deletion_message_wins() {
        let now = Utc::now();
        let mut t = tenant();
        let deletion = now + Duration::days(7);
        t.grace_deadline = Some(now + Duration::days(1));
        t.retention_deadline = Some(now + Duration::days(2));
        t.account_deletion_deadline = Some(deletion);

        let err = check_write_allowed(&t, now).unwrap_err();
        assert_eq!(
            err,
            WriteBlocked::AccountDeletionScheduled { deadline: deletion }
        );
        assert!(err.to_string().contains("scheduled for deletion"));
    }
}
