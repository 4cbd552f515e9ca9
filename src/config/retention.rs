//! Grace period and retention sweep configuration.
//!
//! Two windows apply to a tenant that is found over its tier limits:
//! a grace window during which uploads are blocked but nothing is deleted,
//! followed by a retention window after which the oldest models are evicted.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! grace_period_days = 14
//! retention_period_days = 30
//! interval_hours = 24
//! ```

use serde::{Deserialize, Serialize};

/// Grace/retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Days between detecting over-limit usage and the grace deadline.
    /// Default: 14
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,

    /// Days after the grace deadline before eviction starts.
    /// Default: 30
    #[serde(default = "default_retention_period_days")]
    pub retention_period_days: u32,

    /// How often the long-running worker repeats the sweep (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            grace_period_days: default_grace_period_days(),
            retention_period_days: default_retention_period_days(),
            interval_hours: default_interval_hours(),
        }
    }
}

fn default_grace_period_days() -> u32 {
    14
}

fn default_retention_period_days() -> u32 {
    30
}

fn default_interval_hours() -> u64 {
    24
}

impl RetentionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.grace_period_days == 0 {
            return Err("retention.grace_period_days must be at least 1".to_string());
        }
        if self.retention_period_days == 0 {
            return Err("retention.retention_period_days must be at least 1".to_string());
        }
        if self.interval_hours == 0 {
            return Err("retention.interval_hours must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.grace_period_days))
    }

    pub fn retention_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_period_days))
    }

    /// Get the worker interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert_eq!(config.grace_period_days, 14);
        assert_eq!(config.retention_period_days, 30);
        assert_eq!(config.interval_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config: RetentionConfig = toml::from_str(
            r#"
            grace_period_days = 7
            retention_period_days = 60
            interval_hours = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.grace_period(), chrono::Duration::days(7));
        assert_eq!(config.retention_period(), chrono::Duration::days(60));
        assert_eq!(config.interval(), std::time::Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_zero_windows_rejected() {
        let config = RetentionConfig {
            retention_period_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
