//! Stock worker
//!
//! Keeps low-stock alerts reconciled with part stock: one sweep at start-up,
//! then one every `alerts.sweep_interval_secs`. Raised alerts are logged as
//! they are published.

use std::{sync::Arc, time::Duration};

use backend::clock::SystemClock;
use backend::store::PgStore;
use backend::{Config, Engine};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stock_worker=debug,backend=debug,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting stock worker");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let engine = Engine::new(PgStore::new(db_pool), Arc::new(SystemClock), &config);

    let mut events = engine.alerts.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::warn!(
                    part_id = %event.part_id,
                    sku = %event.sku,
                    current_stock = event.current_stock,
                    minimal_stock = event.minimal_stock,
                    "Part is low on stock"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Low-stock listener fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let period = Duration::from_secs(config.alerts.sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    tracing::info!("Reconciling low-stock alerts every {:?}", period);

    loop {
        tokio::select! {
            // first tick completes immediately
            _ = ticker.tick() => {
                if let Err(err) = engine.alerts.reconcile_all().await {
                    tracing::error!(error = %err, code = err.code(), "Low-stock sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down stock worker");
                break;
            }
        }
    }

    Ok(())
}
