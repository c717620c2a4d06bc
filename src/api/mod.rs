pub mod content_negotiation;
pub mod handlers;
pub mod routes;

pub use handlers::{AppState, SharedState};
pub use routes::{cohort_routes, health_routes, record_routes};
