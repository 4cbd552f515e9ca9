//! Prometheus metrics for the enforcement jobs.
//!
//! Provides metrics for:
//! - Models evicted by the retention sweep
//! - Sweep runs by kind and final status
//! - Accounts processed by the account deletion sweep

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let listen: std::net::SocketAddr = config
        .listen
        .parse()
        .map_err(|e| MetricsError::Setup(format!("Invalid metrics listen address: {}", e)))?;

    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(MetricsError::Install)?;

    tracing::info!(listen = %listen, "Prometheus metrics enabled");
    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
            Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record a model evicted by the retention sweep.
pub fn record_eviction(bytes: i64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_models_evicted_total").increment(1);
        counter!("retention_bytes_evicted_total").increment(bytes.max(0) as u64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = bytes;
    }
}

/// Record a finished sweep run.
///
/// # Arguments
/// * `kind` - `retention` or `account_deletion`
/// * `status` - final run status (`completed` or `failed`)
/// * `duration_secs` - wall-clock duration of the run
pub fn record_sweep_run(kind: &str, status: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "sweep_runs_total",
            "kind" => kind.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        gauge!(
            "sweep_last_run_duration_seconds",
            "kind" => kind.to_string()
        )
        .set(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (kind, status, duration_secs);
    }
}

/// Record one processed account from the account deletion sweep.
pub fn record_account_deletion(status: &str, bytes: i64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "account_deletions_total",
            "status" => status.to_string()
        )
        .increment(1);
        counter!("account_deletion_bytes_total").increment(bytes.max(0) as u64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (status, bytes);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        record_eviction(1024);
        record_sweep_run("retention", "completed", 0.5);
        record_account_deletion("deleted", 2048);
    }

    #[test]
    fn test_disabled_metrics_init_is_noop() {
        let config = MetricsConfig::default();
        assert!(init_metrics(&config).is_ok());
    }
}
