use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an audited sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

/// Outcome of enforcing retention on one tenant within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionItemOutcome {
    NoGrace,
    WithinRetentionWindow,
    /// Already compliant when re-checked; grace cleared without deleting.
    CleanupSkipped,
    CleanupDone,
    /// Enforcement aborted for this tenant (database error, unknown tenant).
    Failed,
}

impl RetentionItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionItemOutcome::NoGrace => "no_grace",
            RetentionItemOutcome::WithinRetentionWindow => "within_retention_window",
            RetentionItemOutcome::CleanupSkipped => "cleanup_skipped",
            RetentionItemOutcome::CleanupDone => "cleanup_done",
            RetentionItemOutcome::Failed => "failed",
        }
    }
}

impl FromStr for RetentionItemOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_grace" => Ok(RetentionItemOutcome::NoGrace),
            "within_retention_window" => Ok(RetentionItemOutcome::WithinRetentionWindow),
            "cleanup_skipped" => Ok(RetentionItemOutcome::CleanupSkipped),
            "cleanup_done" => Ok(RetentionItemOutcome::CleanupDone),
            "failed" => Ok(RetentionItemOutcome::Failed),
            _ => Err(format!("Invalid retention item outcome: {}", s)),
        }
    }
}

/// One retention sweep invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tenants_checked: i64,
    pub tenants_cleaned: i64,
    pub models_deleted: i64,
    pub bytes_freed: i64,
    pub error_message: Option<String>,
}

/// One tenant processed by a retention run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionRunItem {
    pub id: Uuid,
    pub run_id: Uuid,
    pub tenant_id: Uuid,
    pub outcome: RetentionItemOutcome,
    pub deleted_model_ids: Vec<Uuid>,
    pub bytes_freed: i64,
    pub compliant: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRetentionRunItem {
    pub tenant_id: Uuid,
    pub outcome: RetentionItemOutcome,
    pub deleted_model_ids: Vec<Uuid>,
    pub bytes_freed: i64,
    pub compliant: bool,
    pub error_message: Option<String>,
}

/// Final counters written when a retention run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionRunTotals {
    pub tenants_checked: i64,
    pub tenants_cleaned: i64,
    pub models_deleted: i64,
    pub bytes_freed: i64,
}

/// Per-account outcome within an account deletion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountDeletionItemStatus {
    Deleted,
    Failed,
}

impl AccountDeletionItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountDeletionItemStatus::Deleted => "deleted",
            AccountDeletionItemStatus::Failed => "failed",
        }
    }
}

impl FromStr for AccountDeletionItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deleted" => Ok(AccountDeletionItemStatus::Deleted),
            "failed" => Ok(AccountDeletionItemStatus::Failed),
            _ => Err(format!("Invalid account deletion item status: {}", s)),
        }
    }
}

/// Result of purging one tenant owned by a deleted account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDeletionResult {
    pub tenant_id: Uuid,
    pub tenant_slug: String,
    pub objects_deleted: i64,
    pub objects_failed: i64,
    pub bytes_deleted: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TenantDeletionResult {
    /// Leftover objects from a partial batch failure do not fail the tenant.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// One account deletion sweep invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDeletionRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub batch_size: i64,
    pub max_due_accounts: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub due_accounts: i64,
    pub deleted_accounts: i64,
    pub failed_accounts: i64,
    /// Bytes freed by successfully deleted accounts only.
    pub deleted_bytes: i64,
    pub error_message: Option<String>,
}

/// One due account processed by an account deletion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDeletionRunItem {
    pub id: Uuid,
    pub run_id: Uuid,
    pub user_id: Uuid,
    pub status: AccountDeletionItemStatus,
    pub deleted_bytes: i64,
    pub tenant_results: Vec<TenantDeletionResult>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccountDeletionRunItem {
    pub user_id: Uuid,
    pub status: AccountDeletionItemStatus,
    pub deleted_bytes: i64,
    pub tenant_results: Vec<TenantDeletionResult>,
    pub error_message: Option<String>,
}

/// Final counters written when an account deletion run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountDeletionRunTotals {
    pub due_accounts: i64,
    pub deleted_accounts: i64,
    pub failed_accounts: i64,
    pub deleted_bytes: i64,
}
