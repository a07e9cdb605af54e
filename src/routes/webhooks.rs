use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{callbacks, incoming_call};
use crate::state::AppState;

/// Create the webhook router for unauthenticated webhook endpoints
///
/// EventGrid and ACS call these routes directly. EventGrid proves ownership
/// through the subscription validation handshake, and callback URIs carry a
/// per-call context id.
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/incomingCall", post(incoming_call::handle_incoming_call))
        .route("/api/callbacks", post(callbacks::handle_callback))
        .route(
            "/api/callbacks/{context_id}",
            post(callbacks::handle_context_callback),
        )
        .layer(TraceLayer::new_for_http())
}
