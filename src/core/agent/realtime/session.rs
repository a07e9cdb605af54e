use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{input_audio_append, map_server_event, response_create, session_update};
use super::{MediaSink, RealtimeBackend, RealtimeConfig, RealtimeError, RealtimeResult};
use crate::core::acs::CallAutomation;
use crate::core::session_store::SessionStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live connection to the model for one call.
#[derive(Clone)]
pub struct SessionHandle {
    call_connection_id: String,
    session_id: Uuid,
    ws_tx: mpsc::UnboundedSender<Message>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionHandle {
    pub fn call_connection_id(&self) -> &str {
        &self.call_connection_id
    }

    pub fn is_open(&self) -> bool {
        !self.ws_tx.is_closed()
    }

    pub fn send_audio(&self, audio_base64: &str) -> RealtimeResult<()> {
        let message = Message::Text(input_audio_append(audio_base64).to_string().into());
        self.ws_tx
            .send(message)
            .map_err(|_| RealtimeError::SessionClosed(self.call_connection_id.clone()))
    }

    pub fn close(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

type Registry = Arc<Mutex<HashMap<String, SessionHandle>>>;

/// Opens and tracks realtime model sessions, one per call connection.
pub struct RealtimeSessionManager {
    config: RealtimeConfig,
    sessions: Registry,
    store: Arc<dyn SessionStore>,
    calls: Arc<dyn CallAutomation>,
}

impl RealtimeSessionManager {
    pub fn new(
        config: RealtimeConfig,
        store: Arc<dyn SessionStore>,
        calls: Arc<dyn CallAutomation>,
    ) -> Self {
        Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            store,
            calls,
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Everything the connection task needs besides the socket.
struct SessionContext {
    call_connection_id: String,
    session_id: Uuid,
    sink: MediaSink,
    store: Arc<dyn SessionStore>,
    calls: Arc<dyn CallAutomation>,
    sessions: Registry,
    hangup_on_goodbye: bool,
}

impl SessionContext {
    async fn record_transcript(&self, role: &str, text: &str) {
        if let Err(e) = self
            .store
            .append_message(&self.call_connection_id, role, text)
            .await
        {
            warn!(
                call_connection_id = %self.call_connection_id,
                error = %e,
                "Failed to store transcript"
            );
        }
    }

    async fn hang_up(&self) {
        info!(call_connection_id = %self.call_connection_id, "Assistant said goodbye, hanging up");
        if let Err(e) = self.calls.hang_up(&self.call_connection_id, true).await {
            error!(
                call_connection_id = %self.call_connection_id,
                error = %e,
                "Failed to hang up after goodbye"
            );
        }
    }

    /// Drop our registry entry unless a newer session already replaced it.
    fn unregister(&self) {
        let mut sessions = self.sessions.lock();
        if sessions
            .get(&self.call_connection_id)
            .is_some_and(|h| h.session_id == self.session_id)
        {
            sessions.remove(&self.call_connection_id);
        }
    }
}

async fn run_session(
    config: RealtimeConfig,
    instructions: String,
    ctx: SessionContext,
    mut ws_rx: mpsc::UnboundedReceiver<Message>,
    mut shutdown_rx: broadcast::Receiver<()>,
    ready_tx: oneshot::Sender<RealtimeResult<()>>,
) {
    let request = match config.websocket_url().and_then(|url| {
        let host = match url.port() {
            Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(url.as_str())
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .header("api-key", &config.api_key)
            .header("x-ms-client-request-id", ctx.session_id.to_string())
            .body(())
            .map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))
    }) {
        Ok(request) => request,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            ctx.unregister();
            return;
        }
    };

    let ws_stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            error!(
                call_connection_id = %ctx.call_connection_id,
                error = %e,
                "Failed to connect to realtime backend"
            );
            let _ = ready_tx.send(Err(RealtimeError::ConnectionFailed(e.to_string())));
            ctx.unregister();
            return;
        }
    };

    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let setup = [
        session_update(&config, &instructions),
        response_create(),
    ];
    for message in setup {
        if let Err(e) = ws_sink.send(Message::Text(message.to_string().into())).await {
            let _ = ready_tx.send(Err(RealtimeError::ConnectionFailed(e.to_string())));
            ctx.unregister();
            return;
        }
    }

    info!(
        call_connection_id = %ctx.call_connection_id,
        session_id = %ctx.session_id,
        "Realtime session started"
    );
    let _ = ready_tx.send(Ok(()));

    let mut goodbye_pending = false;

    loop {
        tokio::select! {
            Some(message) = ws_rx.recv() => {
                if let Err(e) = ws_sink.send(message).await {
                    error!(call_connection_id = %ctx.call_connection_id, error = %e, "Failed to send to realtime backend");
                    break;
                }
            }

            message = ws_stream.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        info!(call_connection_id = %ctx.call_connection_id, ?frame, "Realtime backend closed the session");
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!(call_connection_id = %ctx.call_connection_id, error = %e, "Realtime WebSocket error");
                        break;
                    }
                    None => break,
                };

                let event: serde_json::Value = match serde_json::from_str(text.as_str()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(call_connection_id = %ctx.call_connection_id, error = %e, "Unparseable realtime event");
                        continue;
                    }
                };

                let outcome = map_server_event(&event, &ctx.call_connection_id);

                if let Some(frame) = outcome.frame
                    && ctx.sink.send(frame).is_err()
                {
                    debug!(call_connection_id = %ctx.call_connection_id, "Media socket gone, ending session");
                    break;
                }
                if let Some((role, text)) = &outcome.transcript {
                    ctx.record_transcript(role.as_str(), text).await;
                }
                if outcome.goodbye_detected && ctx.hangup_on_goodbye {
                    goodbye_pending = true;
                }
                if outcome.response_done && goodbye_pending {
                    ctx.hang_up().await;
                    break;
                }
            }

            _ = shutdown_rx.recv() => {
                debug!(call_connection_id = %ctx.call_connection_id, "Realtime session shutdown requested");
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    ctx.unregister();
    info!(call_connection_id = %ctx.call_connection_id, "Realtime session ended");
}

#[async_trait]
impl RealtimeBackend for RealtimeSessionManager {
    async fn start_session(
        &self,
        call_connection_id: &str,
        instructions: String,
        sink: MediaSink,
    ) -> RealtimeResult<SessionHandle> {
        let (ws_tx, ws_rx) = mpsc::unbounded_channel::<Message>();
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = SessionHandle {
            call_connection_id: call_connection_id.to_string(),
            session_id: Uuid::new_v4(),
            ws_tx,
            shutdown_tx,
        };

        if let Some(previous) = self
            .sessions
            .lock()
            .insert(call_connection_id.to_string(), handle.clone())
        {
            warn!(call_connection_id = %call_connection_id, "Replacing existing realtime session");
            previous.close();
        }

        let ctx = SessionContext {
            call_connection_id: call_connection_id.to_string(),
            session_id: handle.session_id,
            sink,
            store: self.store.clone(),
            calls: self.calls.clone(),
            sessions: self.sessions.clone(),
            hangup_on_goodbye: self.config.hangup_on_goodbye,
        };

        tokio::spawn(run_session(
            self.config.clone(),
            instructions,
            ctx,
            ws_rx,
            shutdown_rx,
            ready_tx,
        ));

        match tokio::time::timeout(CONNECT_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(handle),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(RealtimeError::ConnectionFailed(
                "session task ended before connecting".to_string(),
            )),
            Err(_) => {
                handle.close();
                Err(RealtimeError::ConnectionFailed("connection timeout".to_string()))
            }
        }
    }

    async fn forward_audio(
        &self,
        call_connection_id: &str,
        audio_base64: &str,
    ) -> RealtimeResult<()> {
        let handle = self
            .sessions
            .lock()
            .get(call_connection_id)
            .cloned()
            .ok_or_else(|| RealtimeError::SessionNotFound(call_connection_id.to_string()))?;
        handle.send_audio(audio_base64)
    }

    async fn close_session(&self, call_connection_id: &str) {
        let handle = self.sessions.lock().remove(call_connection_id);
        if let Some(handle) = handle {
            info!(call_connection_id = %call_connection_id, "Closing realtime session");
            handle.close();
        }
    }

    fn has_session(&self, call_connection_id: &str) -> bool {
        self.sessions.lock().contains_key(call_connection_id)
    }
}
