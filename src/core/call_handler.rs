//! Play, recognize and hang-up for a single call connection.

use std::sync::Arc;
use tracing::{debug, info};

use crate::core::acs::{
    AcsResult, CallAutomation, CommunicationIdentifier, PlayRequest, PlaySource, RecognizeOptions,
    RecognizeRequest, SpeechOptions,
};
use crate::core::agent::AgentReply;
use crate::core::agent::prompts::{context, truncate_prompt};

/// Seconds ACS waits for the caller to start speaking.
const INITIAL_SILENCE_TIMEOUT_SECS: u32 = 10;

pub struct CallHandler {
    calls: Arc<dyn CallAutomation>,
    call_connection_id: String,
    voice_name: String,
    end_silence_timeout: f64,
}

impl CallHandler {
    pub fn new(
        calls: Arc<dyn CallAutomation>,
        call_connection_id: impl Into<String>,
        voice_name: impl Into<String>,
        end_silence_timeout: f64,
    ) -> Self {
        Self {
            calls,
            call_connection_id: call_connection_id.into(),
            voice_name: voice_name.into(),
            end_silence_timeout,
        }
    }

    pub fn call_connection_id(&self) -> &str {
        &self.call_connection_id
    }

    fn prompt(&self, text: &str) -> PlaySource {
        PlaySource::text(truncate_prompt(text), self.voice_name.clone())
    }

    /// Speak `text` to every participant.
    pub async fn handle_play(&self, text: &str, operation_context: &str) -> AcsResult<()> {
        info!(
            call_connection_id = %self.call_connection_id,
            operation_context = %operation_context,
            "Playing prompt"
        );
        self.calls
            .play_to_all(
                &self.call_connection_id,
                PlayRequest {
                    play_sources: vec![self.prompt(text)],
                    play_to: Vec::new(),
                    operation_context: Some(operation_context.to_string()),
                },
            )
            .await
    }

    /// Speak `text`, then listen to `target` until `END_SILENCE_TIMEOUT`.
    pub async fn handle_recognize(
        &self,
        text: &str,
        target: &CommunicationIdentifier,
        operation_context: &str,
    ) -> AcsResult<()> {
        info!(
            call_connection_id = %self.call_connection_id,
            operation_context = %operation_context,
            "Starting speech recognition"
        );
        let end_silence_timeout_in_ms = (self.end_silence_timeout * 1000.0).round() as u64;
        self.calls
            .start_recognize(
                &self.call_connection_id,
                RecognizeRequest {
                    recognize_input_type: "speech".to_string(),
                    play_prompt: Some(self.prompt(text)),
                    interrupt_call_media_operation: false,
                    recognize_options: RecognizeOptions {
                        interrupt_prompt: false,
                        initial_silence_timeout_in_seconds: INITIAL_SILENCE_TIMEOUT_SECS,
                        target_participant: target.clone(),
                        speech_options: SpeechOptions {
                            end_silence_timeout_in_ms,
                        },
                    },
                    operation_context: Some(operation_context.to_string()),
                },
            )
            .await
    }

    /// Route a model reply: say goodbye on `endCall`, otherwise keep listening.
    pub async fn handle_communicate(
        &self,
        reply: &AgentReply,
        target: &CommunicationIdentifier,
    ) -> AcsResult<()> {
        debug!(
            call_connection_id = %self.call_connection_id,
            intent = %reply.intent,
            "Communicating reply"
        );
        if reply.intent == context::END_CALL {
            self.handle_play(&reply.msg, context::END_CALL).await
        } else {
            self.handle_recognize(&reply.msg, target, context::CONTINUE)
                .await
        }
    }

    pub async fn hang_up(&self) -> AcsResult<()> {
        self.calls.hang_up(&self.call_connection_id, true).await
    }
}
