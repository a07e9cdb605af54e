use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::AppState;
use crate::core::events::{CallbackEvent, parse_event_batch};
use crate::errors::app_error::{AppError, AppResult};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackQuery {
    pub caller_id: Option<String>,
}

/// Mid-call events ACS posts for a call answered or placed with a context id.
pub async fn handle_context_callback(
    State(state): State<Arc<AppState>>,
    Path(context_id): Path<String>,
    Query(query): Query<CallbackQuery>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    debug!(
        context_id = %context_id,
        caller_id = ?query.caller_id,
        "Callback received"
    );
    dispatch_batch(&state, &body).await
}

/// Mid-call events posted without a context id.
pub async fn handle_callback(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    dispatch_batch(&state, &body).await
}

async fn dispatch_batch(state: &AppState, body: &[u8]) -> AppResult<Json<Value>> {
    let events: Vec<CallbackEvent> = parse_event_batch(body).map_err(|e| {
        warn!(error = %e, "Malformed callback payload");
        AppError::BadRequest(format!("Invalid callback payload: {e}"))
    })?;

    for event in &events {
        state.dispatcher.dispatch(event).await;
    }
    Ok(Json(json!({})))
}
