use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media streaming WebSocket router
///
/// ACS connects here with the transport URL handed over when the call was
/// answered or created. The path id is the per-call context id, resolved to
/// the call connection through the session cache.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/{call_id}", get(media_ws::media_ws_handler))
        .layer(TraceLayer::new_for_http())
}
