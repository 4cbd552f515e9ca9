use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use printshelf::{
    config::PrintshelfConfig,
    db::DbPool,
    jobs::{self, SweepOverrides},
    models::RunStatus,
    observability, retention,
    services::Services,
};
use uuid::Uuid;

/// CLI arguments for the printshelf job runner
#[derive(Parser, Debug)]
#[command(version, about = "printshelf usage and retention jobs", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file (defaults to ./printshelf.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run database migrations and exit
    Migrate,
    /// Run one retention sweep over tenants in grace
    RetentionSweep,
    /// Run one account deletion sweep
    AccountDeletionSweep {
        /// Objects per storage delete batch (1-1000)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Refuse to run when more accounts than this are due
        #[arg(long)]
        max_due_accounts: Option<usize>,
    },
    /// Recompute usage and start or clear grace periods
    CheckUsage {
        /// Only check this tenant
        #[arg(long)]
        tenant: Option<Uuid>,
    },
    /// Print ground-truth usage for a tenant as JSON
    Usage {
        /// Tenant ID
        tenant: Uuid,
    },
    /// Run the usage check and retention sweep on the configured interval
    Worker,
    /// Show enabled compile-time features
    Features,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command {
        Command::Migrate => run_migrate(config_path).await,
        Command::RetentionSweep => run_retention_sweep(config_path).await,
        Command::AccountDeletionSweep {
            batch_size,
            max_due_accounts,
        } => {
            run_account_deletion_sweep(
                config_path,
                SweepOverrides {
                    batch_size,
                    max_due_accounts,
                },
            )
            .await
        }
        Command::CheckUsage { tenant } => run_check_usage(config_path, tenant).await,
        Command::Usage { tenant } => run_usage(config_path, tenant).await,
        Command::Worker => run_worker(config_path).await,
        Command::Features => run_features(),
    }
}

fn resolve_config_path(explicit_path: Option<&str>) -> Result<PathBuf, String> {
    let path = PathBuf::from(explicit_path.unwrap_or("printshelf.toml"));
    if !path.exists() {
        return Err(format!("Config file not found: {}", path.display()));
    }
    Ok(path)
}

/// Load config and initialize logging. Exits the process on failure.
fn load_config(explicit_path: Option<&str>) -> PrintshelfConfig {
    let config_path = match resolve_config_path(explicit_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match PrintshelfConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    tracing::debug!(config_file = %config_path.display(), "Configuration loaded");
    config
}

async fn connect(config: &PrintshelfConfig) -> Arc<DbPool> {
    if config.database.is_none() {
        eprintln!("Error: Database is not configured.");
        std::process::exit(1);
    }

    match DbPool::from_config(&config.database).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}

async fn build_services(config: &PrintshelfConfig) -> Services {
    let db = connect(config).await;
    match Services::from_config(db, config).await {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize services");
            eprintln!("Error: Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run database migrations and exit.
///
/// Exits with code 0 on success, 1 on failure.
async fn run_migrate(config_path: Option<&str>) {
    let config = load_config(config_path);
    let db = connect(&config).await;

    match db.run_migrations().await {
        Ok(()) => {
            tracing::info!("Database migrations completed successfully");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "Database migrations failed");
            eprintln!("Error: Database migrations failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Exits non-zero when the run could not start or was recorded as failed.
async fn run_retention_sweep(config_path: Option<&str>) {
    let config = load_config(config_path);
    let services = build_services(&config).await;

    match retention::run_retention_sweep(&services).await {
        Ok(run) => {
            println!(
                "retention run {}: {} ({} tenants checked, {} models deleted, {} bytes freed)",
                run.id, run.status, run.tenants_checked, run.models_deleted, run.bytes_freed
            );
            if run.status == RunStatus::Failed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: Retention sweep could not start: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_account_deletion_sweep(config_path: Option<&str>, overrides: SweepOverrides) {
    let config = load_config(config_path);
    let services = build_services(&config).await;

    match jobs::run_account_deletion_sweep(&services, &config.account_deletion, overrides).await {
        Ok(run) => {
            println!(
                "account deletion run {}: {} ({} due, {} deleted, {} failed, {} bytes)",
                run.id,
                run.status,
                run.due_accounts,
                run.deleted_accounts,
                run.failed_accounts,
                run.deleted_bytes
            );
            if let Some(error) = &run.error_message {
                eprintln!("Error: {}", error);
            }
            if run.status == RunStatus::Failed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: Account deletion sweep could not start: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_check_usage(config_path: Option<&str>, tenant: Option<Uuid>) {
    let config = load_config(config_path);
    let services = build_services(&config).await;

    match tenant {
        Some(tenant_id) => match services.grace.check_usage(tenant_id).await {
            Ok(transition) => println!("{}: {:?}", tenant_id, transition),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => match services.grace.check_all_tenants().await {
            Ok(summary) => {
                println!(
                    "{} checked, {} entered grace, {} cleared, {} failed",
                    summary.checked, summary.entered, summary.cleared, summary.failed
                );
                if summary.failed > 0 {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }
}

async fn run_usage(config_path: Option<&str>, tenant_id: Uuid) {
    let config = load_config(config_path);
    let db = connect(&config).await;

    let usage = match db.usage().compute_usage(tenant_id).await {
        Ok(usage) => usage,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&usage) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_worker(config_path: Option<&str>) {
    let config = load_config(config_path);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let services = build_services(&config).await;
    let worker = tokio::spawn(retention::start_retention_worker(
        services,
        config.retention.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping worker");
        }
        result = worker => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Retention worker task failed");
                std::process::exit(1);
            }
        }
    }
}

fn run_features() {
    let version = env!("CARGO_PKG_VERSION");

    let features: &[(&str, &str, bool)] = &[
        ("cli", "Execution", cfg!(feature = "cli")),
        ("s3-storage", "Storage", cfg!(feature = "s3-storage")),
        ("prometheus", "Observability", cfg!(feature = "prometheus")),
    ];

    let profile = if cfg!(feature = "full") {
        "full"
    } else if cfg!(feature = "minimal") {
        "minimal"
    } else {
        "custom"
    };

    println!("printshelf v{version}\n");
    println!("Build profile: {profile}");
    match profile {
        "full" => println!("  (full = cli, prometheus, s3-storage)\n"),
        "minimal" => println!("  (minimal = cli, filesystem storage only)\n"),
        _ => println!(),
    }

    println!("Compile-time features:");

    let mut current_group = "";
    for &(name, group, enabled) in features {
        if group != current_group {
            if !current_group.is_empty() {
                println!();
            }
            println!("  {group}:");
            current_group = group;
        }
        let status = if enabled { "enabled" } else { "disabled" };
        println!("    {name:<32} {status}");
    }
}
