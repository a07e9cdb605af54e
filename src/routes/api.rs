use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, outbound};
use crate::state::AppState;
use std::sync::Arc;

/// Public probes served without authentication
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::root))
        .route("/health", get(api::health_check))
        .route("/robots933456.txt", get(api::robots_probe))
}

/// Operator routes; callers layer the auth middleware on top
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/initiateOutboundCall",
            post(outbound::initiate_outbound_call),
        )
        .layer(TraceLayer::new_for_http())
}
