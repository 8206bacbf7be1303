use anyhow::Result;
use clap::{Parser, Subcommand};
use grantwatch_store::PgGrantStore;
use grantwatch_sync::SyncConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "grantwatch")]
#[command(about = "Grantwatch nonprofit grant sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync pass against the configured feed and database.
    Sync,
    /// Apply database migrations.
    Migrate,
    /// Serve the JSON API (and the cron scheduler when enabled).
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let report = grantwatch_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} processed={} kept={} rejected={} errors={}",
                report.run_id,
                report.processed,
                report.kept,
                report.rejected,
                report.errors.len()
            );
            for error in &report.errors {
                eprintln!("  {error}");
            }
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let store = PgGrantStore::connect(&config.database_url).await?;
            store.migrate().await?;
            info!("database migrated");
        }
        Commands::Serve => {
            grantwatch_web::serve_from_env().await?;
        }
    }

    Ok(())
}
