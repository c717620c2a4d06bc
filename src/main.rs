use anyhow::Context;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patientset::api::{cohort_routes, health_routes, record_routes, AppState};
use patientset::cohort::CohortService;
use patientset::config::Config;
use patientset::export::RecordAssembler;
use patientset::middleware::{LoggingLayer, RequestIdLayer};
use patientset::repository::{PgStorage, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patientset=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        locale = %config.default_locale,
        unattached = config.unattached_observations.as_str(),
        "Starting patientset server on {}",
        config.server_addr()
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to the clinical database")?;

    tracing::info!("Connected to database");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed");

    let storage: Arc<dyn Storage> = Arc::new(PgStorage::new(pool.clone()));
    let state = Arc::new(AppState {
        cohort: CohortService::new(storage.clone()),
        assembler: RecordAssembler::new(storage, config.export_options()),
        default_locale: config.default_locale.clone(),
    });

    let app = Router::new()
        .merge(cohort_routes(state.clone()))
        .merge(record_routes(state))
        .merge(health_routes(Arc::new(pool)))
        .layer(LoggingLayer)
        .layer(RequestIdLayer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("Listening on {}", config.server_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
