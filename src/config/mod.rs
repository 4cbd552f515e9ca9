//! Configuration module for the printshelf engine.
//!
//! The engine is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [database]
//! type = "sqlite"
//! path = "/var/lib/printshelf/printshelf.db"
//!
//! [storage]
//! backend = "s3"
//!
//! [storage.s3]
//! bucket = "printshelf-models"
//! region = "eu-west-1"
//!
//! [retention]
//! grace_period_days = 14
//! retention_period_days = 30
//!
//! [billing]
//! type = "http"
//! base_url = "https://billing.internal"
//! api_key = "${BILLING_API_KEY}"
//! ```

mod account_deletion;
mod billing;
mod database;
mod observability;
mod retention;
mod storage;
mod tiers;

use std::path::Path;

pub use account_deletion::*;
pub use billing::*;
pub use database::*;
pub use observability::*;
pub use retention::*;
use serde::{Deserialize, Serialize};
pub use storage::*;
pub use tiers::*;

/// Root configuration.
///
/// All sections are optional with defaults, except that a database must be
/// configured before any job can run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrintshelfConfig {
    /// Relational metadata store.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Object storage for model files.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Subscription tiers and their limits.
    #[serde(default)]
    pub tiers: TiersConfig,

    /// Grace period and retention sweep configuration.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Account deletion sweep configuration.
    #[serde(default)]
    pub account_deletion: AccountDeletionConfig,

    /// External billing provider.
    #[serde(default)]
    pub billing: BillingConfig,

    /// Outgoing notifications (deletion completed emails).
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl PrintshelfConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: PrintshelfConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.storage.validate().map_err(ConfigError::Validation)?;
        self.tiers.validate().map_err(ConfigError::Validation)?;
        self.retention.validate().map_err(ConfigError::Validation)?;
        self.account_deletion
            .validate()
            .map_err(ConfigError::Validation)?;
        self.billing.validate().map_err(ConfigError::Validation)?;
        self.notifications
            .validate()
            .map_err(ConfigError::Validation)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables that appear after a `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    static ENV_VAR_RE: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").unwrap());

    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR_RE.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
