pub mod routes;

use crate::state::DensityServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router; uploads larger than `max_upload_bytes` are rejected
pub fn router(state: DensityServiceState, max_upload_bytes: usize) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        .route("/v1/detector", get(routes::detector_info))
        // Density endpoints
        .route("/count", post(routes::count))
        .route("/count_series", post(routes::count_series))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
