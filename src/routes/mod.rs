//! Router assembly by surface: public probes and operator API, ACS webhooks,
//! and the media streaming WebSocket.

pub mod api;
pub mod webhooks;
pub mod ws;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::auth::auth_middleware;
use crate::state::AppState;

/// Full application router: public + protected + webhooks + websocket
pub fn create_app(app_state: Arc<AppState>) -> Router {
    let protected_routes = api::create_api_router().layer(middleware::from_fn_with_state(
        app_state.clone(),
        auth_middleware,
    ));

    api::create_public_router()
        .merge(protected_routes)
        .merge(webhooks::create_webhook_router())
        .merge(ws::create_ws_router())
        .with_state(app_state)
}
