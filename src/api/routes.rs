use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Lease lifecycle -- called by the VMs themselves
    let lease_routes = Router::new()
        .route("/allocate", post(handlers::allocate))
        .route("/liveness", post(handlers::liveness))
        .route("/release", post(handlers::release));

    // Read routes -- operators and dashboards
    let read_routes = Router::new()
        .route("/allocated", get(handlers::list_allocated))
        .route("/client/:client_id", get(handlers::client_details))
        .route("/identifier/:identifier", get(handlers::identifier_details))
        .route("/identifiers", get(handlers::list_identifiers))
        .route("/stats", get(handlers::stats));

    let internal_routes = Router::new().route("/_internal/health", get(handlers::health));

    let request_timeout = state.config.server.request_timeout();

    Router::new()
        .merge(lease_routes)
        .merge(read_routes)
        .merge(internal_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
