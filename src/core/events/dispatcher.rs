//! Routes EventGrid and ACS callback events to their handlers.

use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{
    AcsEventType, CallEventData, CallbackEvent, IncomingCallData, Participant,
    SUB_CODE_INITIAL_SILENCE_TIMEOUT,
};
use crate::config::ServerConfig;
use crate::core::acs::{
    AcsError, AnswerCallRequest, CallConnectionProperties, CallIntelligenceOptions,
    CommunicationIdentifier, CreateCallRequest, MediaStreamingOptions, PhoneNumberIdentifier,
};
use crate::core::agent::prompts::{self, AgentPersona, context};
use crate::core::agent::{ChatError, RealtimeError, parse_agent_reply};
use crate::core::cache::{CacheError, keys};
use crate::core::call_handler::CallHandler;
use crate::core::state::CoreState;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Acs(#[from] AcsError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Realtime(#[from] RealtimeError),
    #[error("Missing {0} in event data")]
    MissingField(&'static str),
    #[error("No target participant known for call {0}")]
    NoTarget(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Result of placing an outbound call.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub call_connection_id: String,
    pub context_id: String,
}

pub struct CallEventDispatcher {
    config: Arc<ServerConfig>,
    core: Arc<CoreState>,
    persona: AgentPersona,
}

impl CallEventDispatcher {
    pub fn new(config: Arc<ServerConfig>, core: Arc<CoreState>) -> Self {
        let persona = config.agent_persona.parse().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to the default persona");
            AgentPersona::Default
        });
        Self {
            config,
            core,
            persona,
        }
    }

    fn call_handler(&self, call_connection_id: &str) -> CallHandler {
        CallHandler::new(
            self.core.calls.clone(),
            call_connection_id,
            self.config.voice_name.clone(),
            self.config.end_silence_timeout,
        )
    }

    fn callback_uri(&self, context_id: &str, caller_id: Option<&str>) -> DispatchResult<String> {
        let base = self.config.callback_events_uri(context_id).ok_or_else(|| {
            AcsError::NotConfigured("CALLBACK_URI_HOST is not set".to_string())
        })?;
        Ok(match caller_id {
            Some(caller) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(caller.as_bytes()).collect();
                format!("{base}?callerId={encoded}")
            }
            None => base,
        })
    }

    fn media_streaming(&self, context_id: &str) -> Option<MediaStreamingOptions> {
        if !self.config.ai_backend.uses_media_streaming() {
            return None;
        }
        self.config
            .media_websocket_uri(context_id)
            .map(MediaStreamingOptions::bidirectional_pcm24k)
    }

    fn call_intelligence(&self) -> Option<CallIntelligenceOptions> {
        self.config
            .cognitive_service_endpoint
            .clone()
            .map(|endpoint| CallIntelligenceOptions {
                cognitive_services_endpoint: endpoint,
            })
    }

    /// Cache the id mappings a new call needs and open its transcript.
    async fn register_call(
        &self,
        call_connection_id: &str,
        context_id: &str,
        target_phone: Option<&str>,
        caller_raw_id: &str,
    ) -> DispatchResult<()> {
        let cache = &self.core.cache;
        cache
            .put(keys::websocket_id(call_connection_id), context_id.to_string())
            .await?;
        cache
            .put(keys::acs_call_id(context_id), call_connection_id.to_string())
            .await?;
        if let Some(phone) = target_phone {
            cache
                .put(keys::target_phone(call_connection_id), phone.to_string())
                .await?;
        }

        if let Err(e) = self
            .core
            .sessions
            .create_session(call_connection_id, caller_raw_id)
            .await
        {
            warn!(call_connection_id = %call_connection_id, error = %e, "Failed to create call session");
        }
        Ok(())
    }

    /// Answer an incoming PSTN call.
    pub async fn handle_incoming_call(
        &self,
        data: IncomingCallData,
    ) -> DispatchResult<CallConnectionProperties> {
        let context_id = Uuid::new_v4().to_string();
        let caller_raw_id = data
            .from
            .raw_id
            .clone()
            .or_else(|| data.from.phone_value().map(|p| format!("4:{p}")))
            .unwrap_or_default();

        let request = AnswerCallRequest {
            incoming_call_context: data.incoming_call_context,
            callback_uri: self.callback_uri(&context_id, Some(&caller_raw_id))?,
            operation_context: None,
            call_intelligence_options: self.call_intelligence(),
            media_streaming_options: self.media_streaming(&context_id),
        };

        info!(
            caller = %caller_raw_id,
            context_id = %context_id,
            correlation_id = %data.correlation_id.as_deref().unwrap_or_default(),
            "Answering incoming call"
        );
        let properties = self.core.calls.answer_call(request).await?;

        self.register_call(
            &properties.call_connection_id,
            &context_id,
            data.from.phone_value(),
            &caller_raw_id,
        )
        .await?;
        Ok(properties)
    }

    /// Place a call to `target_phone`. `payload` holds caller details for the agent.
    pub async fn place_outbound_call(
        &self,
        target_phone: &str,
        payload: &Value,
    ) -> DispatchResult<OutboundCall> {
        let context_id = Uuid::new_v4().to_string();
        let target = CommunicationIdentifier::phone_number(target_phone);

        let request = CreateCallRequest {
            targets: vec![target.clone()],
            source_caller_id_number: self
                .config
                .agent_phone_number
                .clone()
                .map(|value| PhoneNumberIdentifier { value }),
            callback_uri: self.callback_uri(&context_id, None)?,
            operation_context: None,
            call_intelligence_options: self.call_intelligence(),
            media_streaming_options: self.media_streaming(&context_id),
        };

        info!(context_id = %context_id, "Placing outbound call");
        let properties = self.core.calls.create_call(request).await?;
        let call_connection_id = properties.call_connection_id;

        let raw_id = target.raw_id.clone().unwrap_or_default();
        self.register_call(&call_connection_id, &context_id, Some(target_phone), &raw_id)
            .await?;
        self.core
            .cache
            .set_json(keys::payload_dict(&call_connection_id), payload)
            .await?;

        Ok(OutboundCall {
            call_connection_id,
            context_id,
        })
    }

    /// Handle one mid-call event. Failures are logged, never propagated.
    pub async fn dispatch(&self, event: &CallbackEvent) {
        let kind = event.kind();
        let data = &event.data;
        let call_connection_id = data.call_connection_id.as_deref().unwrap_or_default();

        info!(
            event_type = %kind,
            call_connection_id = %call_connection_id,
            correlation_id = %data.correlation_id.as_deref().unwrap_or_default(),
            "Received call event"
        );

        let result = match kind {
            AcsEventType::CallConnected => self.on_call_connected(data).await,
            AcsEventType::ParticipantsUpdated => self.on_participants_updated(data).await,
            AcsEventType::RecognizeCompleted => self.on_recognize_completed(data).await,
            AcsEventType::RecognizeFailed => self.on_recognize_failed(data).await,
            AcsEventType::PlayCompleted => self.on_play_completed(data).await,
            AcsEventType::PlayFailed => self.on_play_failed(data).await,
            AcsEventType::CallDisconnected => self.on_call_disconnected(data).await,
            AcsEventType::MediaStreamingStarted
            | AcsEventType::MediaStreamingStopped
            | AcsEventType::MediaStreamingFailed => {
                info!(
                    event_type = %kind,
                    call_connection_id = %call_connection_id,
                    result = ?data.result_information,
                    "Media streaming update"
                );
                Ok(())
            }
            AcsEventType::IncomingCall | AcsEventType::SubscriptionValidation => {
                debug!(event_type = %kind, "Ignoring EventGrid event on callback route");
                Ok(())
            }
            AcsEventType::Unknown(raw) => {
                debug!(event_type = %raw, "Unhandled call event");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(
                event_type = %event.event_type,
                call_connection_id = %call_connection_id,
                error = %e,
                "Call event handler failed"
            );
        }
    }

    fn connection_id(data: &CallEventData) -> DispatchResult<&str> {
        data.call_connection_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(DispatchError::MissingField("callConnectionId"))
    }

    /// Participant the agent listens to: the matched participant, else the
    /// cached target number.
    async fn target_participant(
        &self,
        call_connection_id: &str,
    ) -> DispatchResult<CommunicationIdentifier> {
        let cache = &self.core.cache;
        let phone = match cache
            .get_string(keys::participant_id(call_connection_id))
            .await?
        {
            Some(phone) => Some(phone),
            None => cache.get_string(keys::target_phone(call_connection_id)).await?,
        };
        phone
            .map(CommunicationIdentifier::phone_number)
            .ok_or_else(|| DispatchError::NoTarget(call_connection_id.to_string()))
    }

    async fn record(&self, call_connection_id: &str, sender: &str, message: &str) {
        if let Err(e) = self
            .core
            .sessions
            .append_message(call_connection_id, sender, message)
            .await
        {
            warn!(call_connection_id = %call_connection_id, error = %e, "Failed to append to call session");
        }
    }

    async fn on_call_connected(&self, data: &CallEventData) -> DispatchResult<()> {
        let id = Self::connection_id(data)?;
        self.core
            .cache
            .put(keys::call_active(id), "true")
            .await?;

        match self.core.calls.get_call_properties(id).await {
            Ok(props) => info!(
                call_connection_id = %id,
                state = %props.call_connection_state.as_deref().unwrap_or("unknown"),
                "Call connected"
            ),
            Err(e) => warn!(call_connection_id = %id, error = %e, "Could not fetch call properties"),
        }

        if self.config.ai_backend.uses_media_streaming() {
            debug!(call_connection_id = %id, "Media stream drives the conversation");
            return Ok(());
        }

        let payload: Option<Value> = self.core.cache.get_json(keys::payload_dict(id)).await?;
        let client_name = payload
            .as_ref()
            .and_then(|p| p.get("client_name"))
            .and_then(Value::as_str);
        let greeting = prompts::greeting(client_name);

        let user_seed = payload.as_ref().map(|p| {
            format!(
                "This is information about my request for you to use during our call: {p}\nNow start the conversation based on this."
            )
        });
        let assistant_seed = json!({"msg": greeting, "intent": context::GREETING}).to_string();
        self.core
            .chat
            .update_agent_persona(id, self.persona, user_seed.as_deref(), Some(&assistant_seed))
            .await?;

        let target = self.target_participant(id).await?;
        self.call_handler(id)
            .handle_recognize(&greeting, &target, context::GREETING)
            .await?;
        self.record(id, "assistant", &greeting).await;
        Ok(())
    }

    async fn on_participants_updated(&self, data: &CallEventData) -> DispatchResult<()> {
        let id = Self::connection_id(data)?;
        let cache = &self.core.cache;
        let target = cache.get_string(keys::target_phone(id)).await?;

        let matched = target.as_deref().and_then(|target| {
            data.participants
                .iter()
                .filter_map(|p: &Participant| p.identifier.phone_value())
                .find(|phone| *phone == target)
        });

        match matched {
            Some(phone) => {
                cache.put(keys::participant_id(id), phone.to_string()).await?;
                info!(call_connection_id = %id, participant = %phone, "Target participant joined");
            }
            None => debug!(
                call_connection_id = %id,
                count = data.participants.len(),
                "Target participant not in update"
            ),
        }

        cache
            .set_json(keys::current_participants(id), &data.participants)
            .await?;
        Ok(())
    }

    async fn on_recognize_completed(&self, data: &CallEventData) -> DispatchResult<()> {
        let id = Self::connection_id(data)?;

        if data.recognition_type.as_deref() != Some("speech") {
            info!(
                call_connection_id = %id,
                recognition_type = ?data.recognition_type,
                tones = ?data.dtmf_result.as_ref().map(|d| &d.tones),
                "Ignoring non-speech recognition"
            );
            return Ok(());
        }

        let speech = data
            .speech_result
            .as_ref()
            .map(|s| s.speech.trim())
            .unwrap_or_default();
        let operation_context = data.operation_context.as_deref().unwrap_or(context::CONTINUE);
        info!(call_connection_id = %id, operation_context = %operation_context, speech = %speech, "Recognized speech");

        self.record(id, "user", speech).await;
        self.core.cache.delete(keys::recognize_retry(id)).await?;

        match operation_context {
            context::GREETING | context::CONTINUE => {
                let raw = self.core.chat.get_chat_completion(id, speech).await;
                let reply = parse_agent_reply(&raw, context::CONTINUE);
                let target = self.target_participant(id).await?;
                self.call_handler(id)
                    .handle_communicate(&reply, &target)
                    .await?;
                self.record(id, "assistant", &reply.msg).await;
            }
            context::END_CALL => {
                self.call_handler(id).hang_up().await?;
            }
            other => warn!(call_connection_id = %id, operation_context = %other, "No handler for context"),
        }
        Ok(())
    }

    async fn on_recognize_failed(&self, data: &CallEventData) -> DispatchResult<()> {
        let id = Self::connection_id(data)?;
        let handler = self.call_handler(id);
        let operation_context = data.operation_context.as_deref().unwrap_or(context::CONTINUE);

        warn!(
            call_connection_id = %id,
            operation_context = %operation_context,
            result = ?data.result_information,
            "Recognition failed"
        );

        if data.sub_code() == Some(SUB_CODE_INITIAL_SILENCE_TIMEOUT) {
            let attempt = self.core.cache.incr(keys::recognize_retry(id)).await?;
            if attempt <= i64::from(self.config.max_recognize_retry) {
                info!(call_connection_id = %id, attempt, "Silence timeout, prompting again");
                let target = self.target_participant(id).await?;
                handler
                    .handle_recognize(prompts::TIMEOUT_SILENCE, &target, operation_context)
                    .await?;
                return Ok(());
            }
        }

        handler.handle_play(prompts::GOODBYE, context::GOODBYE).await?;
        self.record(id, "assistant", prompts::GOODBYE).await;
        Ok(())
    }

    async fn on_play_completed(&self, data: &CallEventData) -> DispatchResult<()> {
        let id = Self::connection_id(data)?;
        let operation_context = data.operation_context.as_deref().unwrap_or_default();
        self.record(id, "application", &format!("Play completed: {operation_context}"))
            .await;

        if matches!(operation_context, context::GOODBYE | context::END_CALL) {
            info!(call_connection_id = %id, "Goodbye played, hanging up");
            self.call_handler(id).hang_up().await?;
        }
        Ok(())
    }

    async fn on_play_failed(&self, data: &CallEventData) -> DispatchResult<()> {
        let id = Self::connection_id(data)?;
        let operation_context = data.operation_context.as_deref().unwrap_or_default();
        error!(
            call_connection_id = %id,
            operation_context = %operation_context,
            result = ?data.result_information,
            "Play failed"
        );
        if matches!(operation_context, context::GOODBYE | context::END_CALL) {
            self.call_handler(id).hang_up().await?;
        }
        Ok(())
    }

    async fn on_call_disconnected(&self, data: &CallEventData) -> DispatchResult<()> {
        let id = Self::connection_id(data)?;

        if let Some(realtime) = &self.core.realtime {
            realtime.close_session(id).await;
        }

        if let Err(e) = self.core.sessions.close_session(id).await {
            warn!(call_connection_id = %id, error = %e, "Failed to close call session");
        }

        let cache = &self.core.cache;
        if let Some(context_id) = cache.get_string(keys::websocket_id(id)).await? {
            cache.delete(keys::acs_call_id(&context_id)).await?;
        }
        let removed = cache.delete_by_pattern(&keys::all_for_call(id)).await?;
        info!(call_connection_id = %id, removed, "Call disconnected, state cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiBackend;
    use crate::core::agent::{ChatConfig, ChatService};
    use crate::core::cache::{CacheConfig, CacheStore};
    use crate::core::call_handler::tests::RecordingCalls;
    use crate::core::session_store::{MemorySessionStore, SessionStore};
    use crate::utils::req_manager::ReqManager;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        dispatcher: CallEventDispatcher,
        calls: Arc<RecordingCalls>,
        sessions: Arc<MemorySessionStore>,
        core: Arc<CoreState>,
    }

    async fn harness(backend: AiBackend, chat_endpoint: Option<String>) -> Harness {
        let config = ServerConfig {
            callback_uri_host: Some("https://agent.example.com".into()),
            ai_backend: backend,
            max_recognize_retry: 2,
            ..Default::default()
        };
        let cache = Arc::new(
            CacheStore::from_config(CacheConfig::Memory {
                max_entries: 1000,
                ttl_seconds: None,
            })
            .await
            .unwrap(),
        );
        let req_manager = Arc::new(ReqManager::new(2).unwrap());
        let chat = ChatService::new(
            chat_endpoint.map(|endpoint| ChatConfig {
                endpoint,
                api_key: "k".into(),
                deployment: "gpt-4o-mini".into(),
                api_version: "2024-08-01-preview".into(),
            }),
            AgentPersona::Default,
            cache.clone(),
            req_manager.clone(),
        );
        let calls = Arc::new(RecordingCalls::default());
        let sessions = Arc::new(MemorySessionStore::new());
        let core = CoreState::from_parts(
            cache,
            calls.clone(),
            sessions.clone(),
            Arc::new(chat),
            None,
            req_manager,
        );
        Harness {
            dispatcher: CallEventDispatcher::new(Arc::new(config), core.clone()),
            calls,
            sessions,
            core,
        }
    }

    fn event(event_type: &str, data: Value) -> CallbackEvent {
        serde_json::from_value(json!({
            "type": format!("Microsoft.Communication.{event_type}"),
            "data": data
        }))
        .unwrap()
    }

    fn incoming_call() -> IncomingCallData {
        serde_json::from_value(json!({
            "to": {"rawId": "4:+18005550100", "phoneNumber": {"value": "+18005550100"}},
            "from": {"rawId": "4:+14255550123", "kind": "phoneNumber",
                     "phoneNumber": {"value": "+14255550123"}},
            "incomingCallContext": "ctx"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_incoming_call_answers_and_registers() {
        let h = harness(AiBackend::VoiceLive, None).await;
        let props = h.dispatcher.handle_incoming_call(incoming_call()).await.unwrap();
        assert_eq!(props.call_connection_id, "conn-answered");

        let answers = h.calls.answers.lock();
        let request = &answers[0];
        assert!(request
            .callback_uri
            .starts_with("https://agent.example.com/api/callbacks/"));
        assert!(request.callback_uri.ends_with("?callerId=4%3A%2B14255550123"));
        let media = request.media_streaming_options.as_ref().unwrap();
        assert!(media.transport_url.starts_with("wss://agent.example.com/ws/"));

        let context_id = h
            .core
            .cache
            .get_string(keys::websocket_id("conn-answered"))
            .await
            .unwrap()
            .unwrap();
        assert!(media.transport_url.ends_with(&context_id));
        assert_eq!(
            h.core
                .cache
                .get_string(keys::acs_call_id(&context_id))
                .await
                .unwrap()
                .as_deref(),
            Some("conn-answered")
        );
        let session = h.sessions.get_session("conn-answered").await.unwrap();
        assert_eq!(session.caller_id, "4:+14255550123");
    }

    #[tokio::test]
    async fn test_pipeline_answer_has_no_media_streaming() {
        let h = harness(AiBackend::Pipeline, None).await;
        h.dispatcher.handle_incoming_call(incoming_call()).await.unwrap();
        assert!(h.calls.answers.lock()[0].media_streaming_options.is_none());
    }

    #[tokio::test]
    async fn test_call_connected_greets_in_pipeline_mode() {
        let h = harness(AiBackend::Pipeline, None).await;
        let outbound = h
            .dispatcher
            .place_outbound_call("+14255550123", &json!({"client_name": "Ada"}))
            .await
            .unwrap();
        let id = outbound.call_connection_id.clone();

        h.dispatcher
            .dispatch(&event("CallConnected", json!({"callConnectionId": id})))
            .await;

        let recognizes = h.calls.recognizes.lock();
        let (_, request) = &recognizes[0];
        assert_eq!(request.operation_context.as_deref(), Some("doGreetingCall"));
        assert!(request
            .play_prompt
            .as_ref()
            .unwrap()
            .text
            .text
            .starts_with("Hello Ada! "));
        assert_eq!(
            request.recognize_options.target_participant.phone_value(),
            Some("+14255550123")
        );
        assert_eq!(
            h.core.cache.get_string(keys::call_active(&id)).await.unwrap().as_deref(),
            Some("true")
        );

        let history = h.core.chat.history(&id).await.unwrap();
        assert_eq!(history[0].role, "system");
        assert!(history[1].content.contains("Ada"));
    }

    #[tokio::test]
    async fn test_call_connected_in_realtime_mode_does_not_greet() {
        let h = harness(AiBackend::VoiceLive, None).await;
        h.dispatcher
            .dispatch(&event("CallConnected", json!({"callConnectionId": "conn-1"})))
            .await;
        assert!(h.calls.recognizes.lock().is_empty());
        assert!(h.calls.plays.lock().is_empty());
    }

    #[tokio::test]
    async fn test_recognize_completed_runs_chat_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content":
                    "{\"msg\": \"Lovely. How many travelers?\", \"intent\": \"continueCall\"}"}}]
            })))
            .mount(&server)
            .await;

        let h = harness(AiBackend::Pipeline, Some(format!("{}/", server.uri()))).await;
        h.core
            .cache
            .put(keys::target_phone("conn-1"), "+14255550123")
            .await
            .unwrap();
        h.sessions.create_session("conn-1", "4:+14255550123").await.unwrap();

        h.dispatcher
            .dispatch(&event(
                "RecognizeCompleted",
                json!({"callConnectionId": "conn-1", "recognitionType": "speech",
                       "operationContext": "doGreetingCall",
                       "speechResult": {"speech": "Yes, now is fine."}}),
            ))
            .await;

        let recognizes = h.calls.recognizes.lock();
        let (_, request) = &recognizes[0];
        assert_eq!(request.operation_context.as_deref(), Some("continueCall"));
        assert_eq!(
            request.play_prompt.as_ref().unwrap().text.text,
            "Lovely. How many travelers?"
        );

        let session = h.sessions.get_session("conn-1").await.unwrap();
        assert_eq!(session.conversation[0].sender, "user");
        assert_eq!(session.conversation[0].message, "Yes, now is fine.");
        assert_eq!(session.conversation[1].sender, "assistant");
    }

    #[tokio::test]
    async fn test_recognize_completed_end_call_hangs_up() {
        let h = harness(AiBackend::Pipeline, None).await;
        h.dispatcher
            .dispatch(&event(
                "RecognizeCompleted",
                json!({"callConnectionId": "conn-1", "recognitionType": "speech",
                       "operationContext": "endCall", "speechResult": {"speech": "bye"}}),
            ))
            .await;
        assert_eq!(h.calls.hangups.lock().as_slice(), ["conn-1".to_string()]);
    }

    #[tokio::test]
    async fn test_silence_retries_then_goodbye() {
        let h = harness(AiBackend::Pipeline, None).await;
        h.core
            .cache
            .put(keys::target_phone("conn-1"), "+14255550123")
            .await
            .unwrap();
        let failed = event(
            "RecognizeFailed",
            json!({"callConnectionId": "conn-1", "operationContext": "continueCall",
                   "resultInformation": {"code": 400, "subCode": 8510, "message": "silence"}}),
        );

        for _ in 0..3 {
            h.dispatcher.dispatch(&failed).await;
        }

        let recognizes = h.calls.recognizes.lock();
        assert_eq!(recognizes.len(), 2);
        assert_eq!(
            recognizes[0].1.play_prompt.as_ref().unwrap().text.text,
            prompts::TIMEOUT_SILENCE
        );
        assert_eq!(recognizes[1].1.operation_context.as_deref(), Some("continueCall"));

        let plays = h.calls.plays.lock();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].1.operation_context.as_deref(), Some("goodbye"));
        assert_eq!(plays[0].1.play_sources[0].text.text, prompts::GOODBYE);
    }

    #[tokio::test]
    async fn test_other_recognize_failure_says_goodbye() {
        let h = harness(AiBackend::Pipeline, None).await;
        h.dispatcher
            .dispatch(&event(
                "RecognizeFailed",
                json!({"callConnectionId": "conn-1",
                       "resultInformation": {"code": 500, "subCode": 8532}}),
            ))
            .await;
        assert!(h.calls.recognizes.lock().is_empty());
        assert_eq!(h.calls.plays.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_play_completed_goodbye_hangs_up() {
        let h = harness(AiBackend::Pipeline, None).await;
        h.dispatcher
            .dispatch(&event(
                "PlayCompleted",
                json!({"callConnectionId": "conn-1", "operationContext": "goodbye"}),
            ))
            .await;
        h.dispatcher
            .dispatch(&event(
                "PlayCompleted",
                json!({"callConnectionId": "conn-2", "operationContext": "other"}),
            ))
            .await;
        assert_eq!(h.calls.hangups.lock().as_slice(), ["conn-1".to_string()]);
    }

    #[tokio::test]
    async fn test_participants_updated_matches_target() {
        let h = harness(AiBackend::Pipeline, None).await;
        h.core
            .cache
            .put(keys::target_phone("conn-1"), "+14255550123")
            .await
            .unwrap();

        h.dispatcher
            .dispatch(&event(
                "ParticipantsUpdated",
                json!({"callConnectionId": "conn-1", "participants": [
                    {"identifier": {"rawId": "4:+18005550100", "kind": "phoneNumber",
                                    "phoneNumber": {"value": "+18005550100"}}, "isMuted": false},
                    {"identifier": {"rawId": "4:+14255550123", "kind": "phoneNumber",
                                    "phoneNumber": {"value": "+14255550123"}}, "isMuted": false}
                ]}),
            ))
            .await;

        let cache = &h.core.cache;
        assert_eq!(
            cache.get_string(keys::participant_id("conn-1")).await.unwrap().as_deref(),
            Some("+14255550123")
        );
        let participants: Vec<Participant> = cache
            .get_json(keys::current_participants("conn-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(participants.len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_clears_state_and_closes_session() {
        let h = harness(AiBackend::VoiceLive, None).await;
        let props = h.dispatcher.handle_incoming_call(incoming_call()).await.unwrap();
        let id = props.call_connection_id;
        let cache = &h.core.cache;
        cache.put(keys::call_active(&id), "true").await.unwrap();
        let context_id = cache.get_string(keys::websocket_id(&id)).await.unwrap().unwrap();

        h.dispatcher
            .dispatch(&event("CallDisconnected", json!({"callConnectionId": id})))
            .await;

        assert!(!cache.exists(keys::call_active(&id)).await.unwrap());
        assert!(!cache.exists(keys::websocket_id(&id)).await.unwrap());
        assert!(!cache.exists(keys::acs_call_id(&context_id)).await.unwrap());
        assert!(h
            .sessions
            .get_session(&id)
            .await
            .unwrap()
            .call_end_time
            .is_some());
    }

    #[tokio::test]
    async fn test_missing_callback_host_fails_answer() {
        let mut h = harness(AiBackend::Pipeline, None).await;
        h.dispatcher = CallEventDispatcher::new(Arc::new(ServerConfig::default()), h.core.clone());
        let err = h.dispatcher.handle_incoming_call(incoming_call()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Acs(AcsError::NotConfigured(_))));
        assert!(h.calls.answers.lock().is_empty());
    }
}
