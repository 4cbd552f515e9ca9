//! Account deletion sweep configuration.
//!
//! ```toml
//! [account_deletion]
//! batch_size = 1000
//! list_page_size = 1000
//! max_due_accounts = 500
//! ```

use serde::{Deserialize, Serialize};

/// Configuration for the account deletion sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountDeletionConfig {
    /// Number of storage keys deleted per batch call.
    /// S3 accepts at most 1000 keys per DeleteObjects request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Page size used when listing a tenant's storage prefix.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,

    /// Sanity threshold: refuse to run when more accounts than this are due.
    /// Guards against a bad migration or clock skew marking everyone for deletion.
    /// Set to 0 to disable the check.
    #[serde(default = "default_max_due_accounts")]
    pub max_due_accounts: usize,

    /// Deadline for each billing or notification call.
    #[serde(default = "default_external_timeout_secs")]
    pub external_timeout_secs: u64,
}

impl Default for AccountDeletionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            list_page_size: default_list_page_size(),
            max_due_accounts: default_max_due_accounts(),
            external_timeout_secs: default_external_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    1000
}

fn default_list_page_size() -> usize {
    1000
}

fn default_max_due_accounts() -> usize {
    500
}

fn default_external_timeout_secs() -> u64 {
    30
}

impl AccountDeletionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err("account_deletion.batch_size must be between 1 and 1000".to_string());
        }
        if self.list_page_size == 0 {
            return Err("account_deletion.list_page_size must be at least 1".to_string());
        }
        if self.external_timeout_secs == 0 {
            return Err("account_deletion.external_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn external_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.external_timeout_secs)
    }
}
