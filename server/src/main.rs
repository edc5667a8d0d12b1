use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use folio_server::clock::SystemClock;
use folio_server::club::engine::ClubEngine;
use folio_server::club::registry::SessionRegistry;
use folio_server::club::repository::SessionRepository;
use folio_server::club::sweeper::DeadlineSweeper;
use folio_server::config::ServerConfig;
use folio_server::db::pool::{create_pool, run_migrations};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::load("folio.toml");

    // Initialize database
    let pool = create_pool(&config.database.url)
        .await
        .expect("failed to connect to database");

    run_migrations(&pool)
        .await
        .expect("failed to run database migrations");

    // Wire up the lifecycle core: one registry, one engine, one sweeper
    let registry = Arc::new(SessionRegistry::new());
    let repo = SessionRepository::new(pool);
    let (engine, mut events) = ClubEngine::new(registry, repo, Arc::new(SystemClock));
    let engine = Arc::new(engine);

    // The chat layer consumes this stream to render announcements; until
    // one is attached, surface them in the log.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(?event, "session announcement");
        }
    });

    let sweep_period = Duration::from_secs(config.sweep.period_secs);
    DeadlineSweeper::new(engine, sweep_period).spawn();

    info!(
        "Folio server running, sweep every {}s",
        sweep_period.as_secs()
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    info!("shutting down");
}
