use axum::{extract::State, response::Json};
use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::core::events::{
    AcsEventType, EventGridEvent, IncomingCallData, SubscriptionValidationData, parse_event_batch,
};
use crate::errors::app_error::{AppError, AppResult};

/// EventGrid webhook for the ACS resource.
///
/// Answers the subscription validation handshake and every
/// `Microsoft.Communication.IncomingCall` in the batch.
pub async fn handle_incoming_call(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let events: Vec<EventGridEvent> = parse_event_batch(&body).map_err(|e| {
        warn!(error = %e, "Malformed EventGrid payload");
        AppError::BadRequest(format!("Invalid event payload: {e}"))
    })?;

    let mut handled = 0usize;
    for event in events {
        match event.kind() {
            AcsEventType::SubscriptionValidation => {
                let data: SubscriptionValidationData = serde_json::from_value(event.data)
                    .map_err(|e| AppError::BadRequest(format!("Invalid validation event: {e}")))?;
                info!("EventGrid subscription validation handshake");
                return Ok(Json(json!({ "validationResponse": data.validation_code })));
            }
            AcsEventType::IncomingCall => {
                let data: IncomingCallData = serde_json::from_value(event.data)
                    .map_err(|e| AppError::BadRequest(format!("Invalid incoming call event: {e}")))?;
                let properties = state
                    .dispatcher
                    .handle_incoming_call(data)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Failed to answer incoming call");
                        AppError::InternalServerError(e.to_string())
                    })?;
                info!(
                    call_connection_id = %properties.call_connection_id,
                    "Incoming call answered"
                );
                handled += 1;
            }
            other => debug!(event_type = %other, "Ignoring EventGrid event"),
        }
    }

    if handled == 0 {
        return Err(AppError::BadRequest(
            "No valid events found in request".to_string(),
        ));
    }
    Ok(Json(json!({})))
}
