use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;

pub type SharedPool = Arc<PgPool>;

async fn database_reachable(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ())
}

/// Health check endpoint - checks database connectivity
pub async fn health_check(State(pool): State<SharedPool>) -> (StatusCode, Json<Value>) {
    match database_reachable(&pool).await {
        Ok(()) => {
            tracing::debug!("Health check passed - database connection OK");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "healthy",
                    "database": "connected",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::error!("Health check failed - database error: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "error": "Database connection failed"
                })),
            )
        }
    }
}

/// Ready once the clinical schema is reachable.
pub async fn readiness_check(State(pool): State<SharedPool>) -> (StatusCode, Json<Value>) {
    // One row at most; an empty table still counts as ready.
    let schema = sqlx::query("SELECT 1 FROM patient LIMIT 1")
        .fetch_optional(pool.as_ref())
        .await;

    match schema {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not ready",
                    "database": "unavailable"
                })),
            )
        }
    }
}

pub async fn liveness_check() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "alive"
        })),
    )
}
