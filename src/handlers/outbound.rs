use axum::{extract::State, response::Json};
use bytes::Bytes;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::info;

use crate::AppState;
use crate::errors::app_error::{AppError, AppResult};
use crate::utils::validate_phone_number;

/// Place a call to `phone_number` (or `TARGET_PHONE_NUMBER`).
///
/// Every other field in the body is kept as caller details the agent greets
/// and converses with.
pub async fn initiate_outbound_call(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let payload: Map<String, Value> = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Body must be a JSON object: {e}")))?
    };

    let requested = payload
        .get("phone_number")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .or_else(|| state.config.target_phone_number.clone())
        .ok_or_else(|| {
            AppError::BadRequest(
                "phone_number is required when TARGET_PHONE_NUMBER is not set".to_string(),
            )
        })?;
    let target = validate_phone_number(&requested).map_err(AppError::BadRequest)?;

    let outbound = state
        .dispatcher
        .place_outbound_call(&target, &Value::Object(payload))
        .await?;

    info!(
        call_connection_id = %outbound.call_connection_id,
        context_id = %outbound.context_id,
        "Outbound call created"
    );
    Ok(Json(json!({
        "callConnectionId": outbound.call_connection_id,
        "contextId": outbound.context_id,
    })))
}
