use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::cohort::{describe_patients, query_by_characteristics, query_by_numeric_observation};
use super::handlers::health::{health_check, liveness_check, readiness_check, SharedPool};
use super::handlers::record::{export_record, export_records};
use super::handlers::SharedState;

pub fn cohort_routes(state: SharedState) -> Router {
    Router::new()
        .route("/cohort/characteristics", get(query_by_characteristics))
        .route("/cohort/numeric-observation", get(query_by_numeric_observation))
        .route("/cohort/descriptions", post(describe_patients))
        .with_state(state)
}

pub fn record_routes(state: SharedState) -> Router {
    Router::new()
        .route("/patients/:id/record", get(export_record))
        .route("/patients/records", post(export_records))
        .with_state(state)
}

pub fn health_routes(pool: SharedPool) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
        .with_state(pool)
}
