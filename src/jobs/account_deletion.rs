//! Account deletion sweep for users past their voluntary deletion deadline.
//!
//! For every due user, each owned tenant is torn down in order:
//! 1. Every object under the tenant's storage prefix is listed page by page
//!    and deleted in fixed-size batches
//! 2. The billing subscription and customer are revoked (best effort)
//! 3. The tenant's relational records are purged in one transaction
//!
//! When every tenant succeeded the user is notified (best effort) and the
//! user row is hard-deleted. A user whose tenant cascade fails is recorded as
//! `failed` and left for a later run.

use std::{collections::HashMap, future::Future, time::Instant};

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AccountDeletionConfig,
    db::DbError,
    models::{
        AccountDeletionItemStatus, AccountDeletionRun, AccountDeletionRunTotals,
        NewAccountDeletionRunItem, RunStatus, Tenant, TenantDeletionResult, User,
    },
    observability::metrics,
    services::{Services, with_timeout},
};

#[derive(Debug, Error)]
pub enum AccountDeletionError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("No account deletion is scheduled for user {0}")]
    NotScheduled(Uuid),

    #[error(
        "Refusing to run: {due} accounts are due for deletion, more than the allowed {max}"
    )]
    TooManyDueAccounts { due: i64, max: usize },

    #[error("Invalid sweep override: {0}")]
    InvalidOverride(String),
}

pub type AccountDeletionResult<T> = Result<T, AccountDeletionError>;

/// Operator overrides for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOverrides {
    pub batch_size: Option<usize>,
    pub max_due_accounts: Option<usize>,
}

/// Schedule a voluntary account deletion and block uploads on owned tenants.
#[instrument(skip(services))]
pub async fn schedule_account_deletion(
    services: &Services,
    user_id: Uuid,
    deadline: DateTime<Utc>,
) -> AccountDeletionResult<User> {
    let deadline = deadline.trunc_subsecs(3);
    let user = services
        .db
        .users()
        .schedule_deletion(user_id, deadline)
        .await
        .map_err(|e| match e {
            DbError::NotFound => AccountDeletionError::UserNotFound(user_id),
            other => other.into(),
        })?;

    let tenants = services
        .db
        .tenants()
        .set_account_deletion_deadline_for_owner(user_id, Some(deadline))
        .await?;

    info!(user_id = %user_id, deadline = %deadline, tenants, "Account deletion scheduled");
    Ok(user)
}

/// Cancel a pending account deletion and lift the upload block.
#[instrument(skip(services))]
pub async fn cancel_account_deletion(
    services: &Services,
    user_id: Uuid,
) -> AccountDeletionResult<User> {
    if services.db.users().get_by_id(user_id).await?.is_none() {
        return Err(AccountDeletionError::UserNotFound(user_id));
    }

    let user = services
        .db
        .users()
        .cancel_deletion(user_id, Utc::now().trunc_subsecs(3))
        .await
        .map_err(|e| match e {
            DbError::NotFound => AccountDeletionError::NotScheduled(user_id),
            other => other.into(),
        })?;

    services
        .db
        .tenants()
        .set_account_deletion_deadline_for_owner(user_id, None)
        .await?;

    info!(user_id = %user_id, "Account deletion canceled");
    Ok(user)
}

/// Run one audited account deletion sweep.
pub async fn run_account_deletion_sweep(
    services: &Services,
    config: &AccountDeletionConfig,
    overrides: SweepOverrides,
) -> AccountDeletionResult<AccountDeletionRun> {
    run_account_deletion_sweep_at(services, config, overrides, Utc::now()).await
}

/// Run one audited account deletion sweep as of `now`.
///
/// Failing to create the run record is returned as an error. Anything that
/// goes wrong afterwards, including the due-account sanity threshold, is
/// recorded on the run, which is then returned with status `failed`.
pub async fn run_account_deletion_sweep_at(
    services: &Services,
    config: &AccountDeletionConfig,
    overrides: SweepOverrides,
    now: DateTime<Utc>,
) -> AccountDeletionResult<AccountDeletionRun> {
    let batch_size = overrides.batch_size.unwrap_or(config.batch_size);
    if batch_size == 0 || batch_size > 1000 {
        return Err(AccountDeletionError::InvalidOverride(format!(
            "batch size must be between 1 and 1000, got {}",
            batch_size
        )));
    }
    let max_due_accounts = overrides
        .max_due_accounts
        .unwrap_or(config.max_due_accounts);

    let started = Instant::now();
    let mut run = services
        .db
        .runs()
        .create_account_deletion_run(
            batch_size as i64,
            max_due_accounts as i64,
            now.trunc_subsecs(3),
        )
        .await?;

    info!(
        run_id = %run.id,
        batch_size,
        max_due_accounts,
        "Account deletion sweep started"
    );

    let sweep = Sweep {
        services,
        config,
        batch_size,
        now,
    };
    let mut totals = AccountDeletionRunTotals::default();
    let result = sweep
        .process_due_accounts(run.id, max_due_accounts, &mut totals)
        .await;

    let (status, error_message) = match result {
        Ok(()) => (RunStatus::Completed, None),
        Err(e) => {
            error!(run_id = %run.id, error = %e, "Account deletion sweep failed");
            (RunStatus::Failed, Some(e.to_string()))
        }
    };

    let finished_at = Utc::now().trunc_subsecs(3);
    services
        .db
        .runs()
        .finish_account_deletion_run(run.id, status, totals, error_message.clone(), finished_at)
        .await?;

    run.status = status;
    run.finished_at = Some(finished_at);
    run.due_accounts = totals.due_accounts;
    run.deleted_accounts = totals.deleted_accounts;
    run.failed_accounts = totals.failed_accounts;
    run.deleted_bytes = totals.deleted_bytes;
    run.error_message = error_message;

    metrics::record_sweep_run(
        "account_deletion",
        status.as_str(),
        started.elapsed().as_secs_f64(),
    );
    info!(
        run_id = %run.id,
        status = %status,
        due = totals.due_accounts,
        deleted = totals.deleted_accounts,
        failed = totals.failed_accounts,
        deleted_bytes = totals.deleted_bytes,
        "Account deletion sweep finished"
    );

    Ok(run)
}

struct Sweep<'a> {
    services: &'a Services,
    config: &'a AccountDeletionConfig,
    batch_size: usize,
    now: DateTime<Utc>,
}

impl Sweep<'_> {
    async fn process_due_accounts(
        &self,
        run_id: Uuid,
        max_due_accounts: usize,
        totals: &mut AccountDeletionRunTotals,
    ) -> AccountDeletionResult<()> {
        let users = self.services.db.users();

        let due = users.count_due_for_deletion(self.now).await?;
        totals.due_accounts = due;
        // Zero disables the threshold.
        if max_due_accounts > 0 && due > max_due_accounts as i64 {
            return Err(AccountDeletionError::TooManyDueAccounts {
                due,
                max: max_due_accounts,
            });
        }

        let due_users = users.list_due_for_deletion(self.now, due).await?;

        for user in due_users {
            let item = self.delete_account(&user).await;

            match item.status {
                AccountDeletionItemStatus::Deleted => {
                    totals.deleted_accounts += 1;
                    totals.deleted_bytes += item.deleted_bytes;
                }
                AccountDeletionItemStatus::Failed => totals.failed_accounts += 1,
            }
            metrics::record_account_deletion(item.status.as_str(), item.deleted_bytes);

            self.services
                .db
                .runs()
                .add_account_deletion_item(run_id, item)
                .await?;
        }

        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id))]
    async fn delete_account(&self, user: &User) -> NewAccountDeletionRunItem {
        let failed = |tenant_results: Vec<TenantDeletionResult>,
                      deleted_bytes: i64,
                      message: String| NewAccountDeletionRunItem {
            user_id: user.id,
            status: AccountDeletionItemStatus::Failed,
            deleted_bytes,
            tenant_results,
            error_message: Some(message),
        };

        let tenants = match self.services.db.tenants().list_by_owner(user.id).await {
            Ok(tenants) => tenants,
            Err(e) => return failed(Vec::new(), 0, format!("Failed to list tenants: {}", e)),
        };

        let mut tenant_results = Vec::with_capacity(tenants.len());
        let mut deleted_bytes = 0i64;

        for tenant in &tenants {
            let result = self.delete_tenant(tenant).await;
            deleted_bytes += result.bytes_deleted;

            if let Some(err) = result.error.clone() {
                warn!(
                    user_id = %user.id,
                    tenant_id = %tenant.id,
                    error = %err,
                    "Tenant cascade failed, user left for a later run"
                );
                tenant_results.push(result);
                return failed(
                    tenant_results,
                    deleted_bytes,
                    format!("Tenant {} failed: {}", tenant.slug, err),
                );
            }
            tenant_results.push(result);
        }

        let completed_at = Utc::now();
        let notify = self.external(
            self.services
                .notifier
                .send_account_deletion_completed_email(&user.email, completed_at),
        );
        match notify.await {
            Ok(Ok(())) => debug!(user_id = %user.id, "Deletion notification sent"),
            Ok(Err(e)) => warn!(user_id = %user.id, error = %e, "Deletion notification failed"),
            Err(_) => warn!(user_id = %user.id, "Deletion notification timed out"),
        }

        if let Err(e) = self.services.db.users().hard_delete(user.id).await {
            return failed(
                tenant_results,
                deleted_bytes,
                format!("Failed to delete user: {}", e),
            );
        }

        info!(
            user_id = %user.id,
            tenants = tenant_results.len(),
            deleted_bytes,
            "Account deleted"
        );

        NewAccountDeletionRunItem {
            user_id: user.id,
            status: AccountDeletionItemStatus::Deleted,
            deleted_bytes,
            tenant_results,
            error_message: None,
        }
    }

    /// Run an external call under the configured deadline.
    async fn external<T>(
        &self,
        fut: impl Future<Output = T>,
    ) -> Result<T, tokio::time::error::Elapsed> {
        tokio::time::timeout(self.config.external_timeout(), fut).await
    }

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    async fn delete_tenant(&self, tenant: &Tenant) -> TenantDeletionResult {
        let mut result = TenantDeletionResult {
            tenant_id: tenant.id,
            tenant_slug: tenant.slug.clone(),
            objects_deleted: 0,
            objects_failed: 0,
            bytes_deleted: 0,
            billing_error: None,
            error: None,
        };

        if let Err(e) = self.delete_tenant_objects(tenant, &mut result).await {
            result.error = Some(format!("Storage cleanup failed: {}", e));
            return result;
        }

        let billing_errors = self.revoke_billing(tenant).await;
        if !billing_errors.is_empty() {
            result.billing_error = Some(billing_errors.join("; "));
        }

        if let Err(e) = self.services.db.tenants().purge(tenant.id).await {
            result.error = Some(format!("Failed to purge tenant records: {}", e));
            return result;
        }

        info!(
            tenant_id = %tenant.id,
            objects_deleted = result.objects_deleted,
            objects_failed = result.objects_failed,
            bytes_deleted = result.bytes_deleted,
            "Tenant purged"
        );
        result
    }

    /// Page through the tenant prefix and delete in batches.
    ///
    /// A failing delete batch is logged and counted; only a failed listing
    /// aborts the tenant.
    async fn delete_tenant_objects(
        &self,
        tenant: &Tenant,
        result: &mut TenantDeletionResult,
    ) -> Result<(), crate::services::ObjectStorageError> {
        let storage = &self.services.storage;
        let timeout = self.services.storage_timeout;
        let prefix = tenant.storage_prefix();
        let mut token: Option<String> = None;

        loop {
            let page = with_timeout(
                timeout,
                storage.list_files(&prefix, self.config.list_page_size, token.take()),
            )
            .await?;

            let sizes: HashMap<&str, i64> = page
                .files
                .iter()
                .map(|f| (f.key.as_str(), f.size_bytes))
                .collect();
            let keys: Vec<String> = page.files.iter().map(|f| f.key.clone()).collect();

            for batch in keys.chunks(self.batch_size) {
                match with_timeout(timeout, storage.delete_files(batch)).await {
                    Ok(deleted) => {
                        result.objects_deleted += deleted.deleted.len() as i64;
                        result.objects_failed += deleted.failed.len() as i64;
                        result.bytes_deleted += deleted
                            .deleted
                            .iter()
                            .filter_map(|k| sizes.get(k.as_str()))
                            .sum::<i64>();
                        if !deleted.failed.is_empty() {
                            warn!(
                                tenant_id = %tenant.id,
                                failed = deleted.failed.len(),
                                first_key = %deleted.failed[0].key,
                                first_error = %deleted.failed[0].error,
                                "Partial delete batch failure"
                            );
                        }
                    }
                    Err(e) => {
                        result.objects_failed += batch.len() as i64;
                        warn!(
                            tenant_id = %tenant.id,
                            keys = batch.len(),
                            error = %e,
                            "Delete batch failed"
                        );
                    }
                }
            }

            match page.continuation_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }

        Ok(())
    }

    /// Revoke the subscription, then delete the customer. Returns the errors.
    async fn revoke_billing(&self, tenant: &Tenant) -> Vec<String> {
        let billing = &self.services.billing;
        let mut errors = Vec::new();

        if let Some(subscription_id) = &tenant.billing_subscription_id {
            match self.external(billing.revoke_subscription(subscription_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(format!("revoke subscription: {}", e)),
                Err(_) => errors.push("revoke subscription: timed out".to_string()),
            }
        }

        if let Some(customer_id) = &tenant.billing_customer_id {
            match self.external(billing.delete_customer(customer_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(format!("delete customer: {}", e)),
                Err(_) => errors.push("delete customer: timed out".to_string()),
            }
        }

        for e in &errors {
            warn!(tenant_id = %tenant.id, provider = billing.name(), error = %e, "Billing cleanup failed");
        }
        errors
    }
}
