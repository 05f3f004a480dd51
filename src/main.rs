//! gridiron-relay entry point.
//!
//! Loads configuration, connects the Graph Store and Stats Writer to
//! Postgres, and runs the WebSocket server until a shutdown signal arrives.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridiron_relay::{GameServer, GraphStore, Settings, StatsWriter, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("gridiron-relay v{}", VERSION);

    let settings = Settings::from_env()?;

    let store = Arc::new(GraphStore::connect(&settings.database_url).await?);
    info!("graph snapshot loaded");

    let stats_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    let stats = Arc::new(StatsWriter::new(stats_pool));

    let server = GameServer::new(settings, store, stats);
    server.run().await?;

    Ok(())
}
