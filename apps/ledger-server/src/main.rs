mod config;
mod logging;
mod signals;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger::Ledger;
use tenantkit_db::{DatabaseConfig, Db, connect_db, redact_dsn};

use crate::config::AppConfig;

/// Ledger Server - multi-tenant ledger with enforced tenant isolation
#[derive(Parser)]
#[command(name = "ledger-server")]
#[command(about = "Ledger Server - multi-tenant ledger with enforced tenant isolation")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate, verify tenant policies and serve until shutdown
    Run,
    /// Validate configuration and exit
    Check,
    /// Apply pending migrations and exit
    Migrate,
    /// Check that every tenant-scoped table is protected and exit
    VerifyPolicies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_verbosity(cli.verbose);
    logging::init(&config.logging)?;

    if cli.print_config {
        println!("{}", config.to_redacted_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
        Commands::Migrate => migrate(&config.database).await,
        Commands::VerifyPolicies => verify_policies(&config.database).await,
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    println!("Configuration is valid");
    println!("{}", config.to_redacted_yaml()?);
    Ok(())
}

async fn connect(config: &DatabaseConfig) -> Result<Db> {
    let db = connect_db(&config.dsn, config.connect_opts())
        .await
        .with_context(|| format!("failed to connect to {}", redact_dsn(&config.dsn)))?;
    tracing::info!(dsn = %db.dsn_redacted(), backend = db.db_engine(), "Connected to database");
    Ok(db)
}

async fn migrate(config: &DatabaseConfig) -> Result<()> {
    let db = connect(config).await?;
    let result = Ledger.migrate(&db).await?;
    println!(
        "applied {} migration(s), {} already present",
        result.applied, result.skipped
    );
    Ok(())
}

async fn verify_policies(config: &DatabaseConfig) -> Result<()> {
    let db = connect(config).await?;
    let report = Ledger
        .verify_policies(&db)
        .await
        .context("tenant policy verification failed")?;
    for table in &report.tables {
        println!("{:<16} active", table.table);
    }
    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!("Ledger Server starting");
    let db = connect(&config.database).await?;
    Ledger.migrate(&db).await?;
    Ledger
        .verify_policies(&db)
        .await
        .context("refusing to serve: tenant policy verification failed")?;

    let service = Ledger.service(db.clone(), config.ledger);
    tracing::info!(backend = db.db_engine(), "Ledger ready");

    let result = serve(&db, config.server.policy_check_interval).await;
    db.close().await;
    tracing::info!(
        audit_failures = service.audit_failures(),
        "Ledger Server stopped"
    );
    result
}

/// Wait for shutdown, re-verifying tenant policies every `interval`.
async fn serve(db: &Db, interval: Option<Duration>) -> Result<()> {
    let shutdown = signals::wait_for_shutdown();
    tokio::pin!(shutdown);

    let Some(every) = interval.filter(|d| !d.is_zero()) else {
        return shutdown.await;
    };
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            res = &mut shutdown => return res,
            _ = ticker.tick() => {
                Ledger
                    .verify_policies(db)
                    .await
                    .context("tenant policy found inactive while serving")?;
            }
        }
    }
}
