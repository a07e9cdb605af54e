//! ACS bidirectional media streaming bridge.
//!
//! ACS opens `/ws/{call_id}` once the call is answered with media streaming.
//! Caller audio is forwarded to the realtime model and model audio is written
//! back as `AudioData` frames.

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::agent::{InboundFrame, OutboundFrame, RealtimeBackend, build_instructions};
use crate::core::cache::{CacheStore, keys};
use crate::state::AppState;

/// How long a media stream waits for its call connection to be registered
pub const CALL_CONNECTION_WAIT: Duration = Duration::from_secs(5);
const CALL_CONNECTION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upgrade handler for the media stream of one call
pub async fn media_ws_handler(
    ws: WebSocketUpgrade,
    Path(call_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!(call_id = %call_id, "Media WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_media_socket(socket, call_id, state))
}

async fn handle_media_socket(socket: WebSocket, call_id: String, app_state: Arc<AppState>) {
    let Some(realtime) = app_state.core_state.realtime.clone() else {
        debug!(call_id = %call_id, "No realtime backend, draining media stream");
        drain(socket).await;
        return;
    };

    let cache = app_state.cache();
    let Some(call_connection_id) = wait_for_call_connection(&cache, &call_id).await else {
        return;
    };

    let payload: Option<Value> = cache
        .get_json(keys::payload_dict(&call_connection_id))
        .await
        .unwrap_or_else(|e| {
            warn!(call_connection_id = %call_connection_id, error = %e, "Failed to read caller details");
            None
        });
    let instructions = build_instructions(app_state.core_state.chat.persona(), payload.as_ref());

    let (mut sender, mut receiver) = socket.split();
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let session = match realtime
        .start_session(&call_connection_id, instructions, sink_tx)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            error!(call_connection_id = %call_connection_id, error = %e, "Failed to start realtime session");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!(
        call_connection_id = %call_connection_id,
        call_id = %call_id,
        "Media bridge established"
    );

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = sink_rx.recv().await {
            if let Err(e) = sender.send(Message::Text(frame.to_json().into())).await {
                debug!(error = %e, "Media socket send failed");
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                forward_frame(realtime.as_ref(), &call_connection_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => {
                info!(call_connection_id = %call_connection_id, "Media stream closed by ACS");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(call_connection_id = %call_connection_id, error = %e, "Media socket error");
                break;
            }
        }

        if !session.is_open() {
            info!(call_connection_id = %call_connection_id, "Realtime session ended");
            break;
        }
    }

    realtime.close_session(&call_connection_id).await;
    sender_task.abort();
}

/// Resolve the call connection for a media stream.
///
/// ACS may open the stream before the answer callback stores the
/// `acs_call_id` mapping, so the lookup is retried until
/// `CALL_CONNECTION_WAIT` elapses.
async fn wait_for_call_connection(cache: &CacheStore, call_id: &str) -> Option<String> {
    let key = keys::acs_call_id(call_id);
    let lookup = async {
        loop {
            match cache.get_string(&key).await {
                Ok(Some(id)) => return Some(id),
                Ok(None) => {}
                Err(e) => {
                    error!(call_id = %call_id, error = %e, "Failed to resolve call connection");
                    return None;
                }
            }
            tokio::time::sleep(CALL_CONNECTION_POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(CALL_CONNECTION_WAIT, lookup).await {
        Ok(found) => found,
        Err(_) => {
            warn!(
                call_id = %call_id,
                waited_ms = CALL_CONNECTION_WAIT.as_millis() as u64,
                "No call connection registered for media stream"
            );
            None
        }
    }
}

async fn forward_frame(realtime: &dyn RealtimeBackend, call_connection_id: &str, text: &str) {
    match InboundFrame::parse(text) {
        Ok(InboundFrame::Audio(audio)) => {
            if let Err(e) = realtime.forward_audio(call_connection_id, &audio.data).await {
                debug!(call_connection_id = %call_connection_id, error = %e, "Dropped caller audio");
            }
        }
        Ok(InboundFrame::Metadata(metadata)) => {
            info!(
                call_connection_id = %call_connection_id,
                encoding = ?metadata.encoding,
                sample_rate = ?metadata.sample_rate,
                channels = ?metadata.channels,
                "Media stream metadata"
            );
        }
        Ok(InboundFrame::Dtmf(dtmf)) => {
            info!(call_connection_id = %call_connection_id, tone = %dtmf.data, "DTMF received");
        }
        Ok(InboundFrame::Other(kind)) => {
            debug!(call_connection_id = %call_connection_id, kind = %kind, "Ignoring media frame");
        }
        Err(e) => {
            warn!(call_connection_id = %call_connection_id, error = %e, "Unparseable media frame");
        }
    }
}

async fn drain(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
}
