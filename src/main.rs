//! # Rolodink API Main Entry Point

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use migration::{Migrator, MigratorTrait};
use rolodink::{
    config::ConfigLoader, db::init_pool, server::run_server, supabase::SupabaseAuth,
    telemetry::init_tracing,
};

#[derive(Debug, Parser)]
#[command(name = "rolodink", version, about = "Rolodink API server")]
struct Cli {
    /// Apply pending migrations and exit
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;
    init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "effective configuration");
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None)
        .await
        .context("failed to apply migrations")?;
    tracing::info!("migrations applied");

    if cli.migrate_only {
        return Ok(());
    }

    let auth = SupabaseAuth::from_config(&config).context("failed to build auth client")?;
    run_server(config, db, Arc::new(auth)).await
}
