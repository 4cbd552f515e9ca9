//! Subscription tier limits.
//!
//! ```toml
//! [tiers.free]
//! max_storage_bytes = 524288000   # 500 MiB
//! max_models = 10
//! max_members = 1
//!
//! [tiers.studio]
//! max_storage_bytes = 107374182400
//! # max_models omitted: unlimited
//! max_members = 25
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::TierLimits;

/// Name of the tier every tenant falls back to after a downgrade.
pub const FREE_TIER: &str = "free";

const MIB: i64 = 1024 * 1024;
const GIB: i64 = 1024 * MIB;

/// Tier name to limits mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TiersConfig(BTreeMap<String, TierLimits>);

impl Default for TiersConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            FREE_TIER.to_string(),
            TierLimits {
                max_storage_bytes: 500 * MIB,
                max_models: Some(10),
                max_members: 1,
            },
        );
        tiers.insert(
            "maker".to_string(),
            TierLimits {
                max_storage_bytes: 20 * GIB,
                max_models: Some(500),
                max_members: 5,
            },
        );
        tiers.insert(
            "studio".to_string(),
            TierLimits {
                max_storage_bytes: 200 * GIB,
                max_models: None,
                max_members: 25,
            },
        );
        Self(tiers)
    }
}

impl TiersConfig {
    pub fn get(&self, tier: &str) -> Option<&TierLimits> {
        self.0.get(tier)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.0.is_empty() {
            return Err("At least one [tiers.<name>] table is required".to_string());
        }
        for (name, limits) in &self.0 {
            if limits.max_storage_bytes <= 0 {
                return Err(format!("tiers.{name}.max_storage_bytes must be positive"));
            }
            if let Some(max_models) = limits.max_models
                && max_models <= 0
            {
                return Err(format!(
                    "tiers.{name}.max_models must be positive (omit it for unlimited)"
                ));
            }
            if limits.max_members <= 0 {
                return Err(format!("tiers.{name}.max_members must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl FromIterator<(String, TierLimits)> for TiersConfig {
    fn from_iter<I: IntoIterator<Item = (String, TierLimits)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
