use serde::{Deserialize, Serialize};

use super::TierLimits;

/// Ground-truth usage of a tenant, computed from source tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUsage {
    /// Number of non-deleted models.
    pub model_count: i64,
    /// Sum of file sizes over all non-deleted models.
    pub storage_bytes: i64,
}

impl TenantUsage {
    /// Whether this usage is over either limit. An unlimited model count
    /// skips the count check entirely.
    pub fn exceeds(&self, limits: &TierLimits) -> bool {
        self.storage_bytes > limits.max_storage_bytes
            || limits
                .max_models
                .is_some_and(|max_models| self.model_count > max_models)
    }

    /// Whether adding `models` models totalling `bytes` would stay within limits.
    pub fn fits_after(&self, limits: &TierLimits, models: i64, bytes: i64) -> bool {
        !TenantUsage {
            model_count: self.model_count + models,
            storage_bytes: self.storage_bytes + bytes,
        }
        .exceeds(limits)
    }
}
