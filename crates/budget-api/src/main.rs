//! Budget API server entry point.

use std::sync::Arc;

use budget_api::config::AppConfig;
use budget_api::error::AppError;
use budget_api::routes;
use budget_api::state::{AppState, ReadModels};
use budget_core::clock::{Clock, SystemClock};
use budget_core::repository::EventLog;
use budget_event_store::cipher::DerivedKeyProvider;
use budget_event_store::codec::EventCodec;
use budget_event_store::event_sourced_repository::EventStoreContext;
use budget_event_store::pg_event_log::PgEventLog;
use budget_event_store::pg_snapshot_store::PgSnapshotStore;
use budget_event_store::schema::ensure_schema;
use budget_projection::bus::{BusConfig, BusPublisher};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting budget API server");

    let config = AppConfig::from_env()?;

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    ensure_schema(&pool).await?;

    let log: Arc<dyn EventLog> = Arc::new(PgEventLog::new(pool.clone()));
    let codec = EventCodec::new(Arc::new(DerivedKeyProvider::new(
        config.encryption_key.clone(),
    )));

    // Read models are in memory: rebuild them from the log before serving.
    let read_models = ReadModels::new();
    let dispatcher = Arc::new(
        read_models
            .dispatcher(log.clone(), codec.clone())?
            .with_batch_size(config.projection_batch_size),
    );
    dispatcher.initialize().await?;
    let rebuilt = dispatcher.catch_up().await;
    tracing::info!(
        applied = rebuilt.applied(),
        clean = rebuilt.is_clean(),
        "projections caught up with the event log"
    );

    // From here on each projection follows the log on its own worker.
    let (publisher, bus) = BusPublisher::spawn(
        dispatcher,
        BusConfig {
            poll_interval: config.projection_poll_interval,
            ..BusConfig::default()
        },
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let context = EventStoreContext {
        log,
        snapshots: Arc::new(PgSnapshotStore::new(pool)),
        codec,
        publisher: Arc::new(publisher),
        clock: clock.clone(),
        snapshot_policy: config.snapshot_policy,
    };
    let app_state = AppState::new(context, clock, read_models)?;
    let app = routes::app(app_state);

    // Start server.
    let addr = config.socket_addr()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    bus.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
