//! Realtime protocol messages: the session configuration we send and the
//! mapping from server events to media frames and transcripts.

use serde_json::{Value, json};
use tracing::{debug, error};

use super::{RealtimeConfig, RealtimeProvider};
use crate::core::agent::media::OutboundFrame;
use crate::core::agent::prompts::is_goodbye;

/// `session.update` for the configured provider.
pub fn session_update(config: &RealtimeConfig, instructions: &str) -> Value {
    let session = match config.provider {
        RealtimeProvider::VoiceLive => json!({
            "instructions": instructions,
            "modalities": ["text", "audio"],
            "turn_detection": {
                "type": "azure_semantic_vad",
                "threshold": 0.5,
                "prefix_padding_ms": 200,
                "silence_duration_ms": 200,
                "end_of_utterance_detection": {
                    "model": "semantic_detection_v1",
                    "threshold": 0.01,
                    "timeout": 4
                }
            },
            "input_audio_noise_reduction": { "type": "azure_deep_noise_suppression" },
            "input_audio_echo_cancellation": { "type": "server_echo_cancellation" },
            "input_audio_transcription": { "model": "whisper-1" },
            "voice": {
                "name": config.voice,
                "type": "azure-standard",
                "temperature": 0.8
            }
        }),
        RealtimeProvider::AzureOpenAi => json!({
            "instructions": instructions,
            "modalities": ["text", "audio"],
            "voice": config.voice,
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "input_audio_transcription": { "model": "whisper-1" },
            "turn_detection": { "type": "server_vad" }
        }),
    };

    json!({ "type": "session.update", "session": session })
}

/// Asks the model to speak first.
pub fn response_create() -> Value {
    json!({ "type": "response.create" })
}

pub fn input_audio_append(audio_base64: &str) -> Value {
    json!({ "type": "input_audio_buffer.append", "audio": audio_base64 })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    User,
    Assistant,
}

impl TranscriptRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptRole::User => "user",
            TranscriptRole::Assistant => "assistant",
        }
    }
}

/// What one server event asks the session to do.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventOutcome {
    pub frame: Option<OutboundFrame>,
    pub transcript: Option<(TranscriptRole, String)>,
    /// The assistant said goodbye in this response.
    pub goodbye_detected: bool,
    /// The response finished; a pending goodbye may now hang up.
    pub response_done: bool,
}

/// Map a realtime server event.
pub fn map_server_event(event: &Value, call_connection_id: &str) -> EventOutcome {
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();
    let text_field = |name: &str| {
        event
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };

    let mut outcome = EventOutcome::default();
    match event_type {
        "response.audio.delta" => {
            outcome.frame = text_field("delta").map(OutboundFrame::audio);
        }
        "input_audio_buffer.speech_started" => {
            debug!(call_connection_id = %call_connection_id, "Caller started speaking");
            outcome.frame = Some(OutboundFrame::stop_audio());
        }
        "conversation.item.input_audio_transcription.completed" => {
            outcome.transcript = text_field("transcript").map(|t| (TranscriptRole::User, t));
        }
        "response.audio_transcript.done" => {
            if let Some(transcript) = text_field("transcript") {
                outcome.goodbye_detected = is_goodbye(&transcript);
                outcome.transcript = Some((TranscriptRole::Assistant, transcript));
            }
        }
        "response.done" => {
            outcome.response_done = true;
        }
        "error" => {
            let details = event.get("error").cloned().unwrap_or(Value::Null);
            let detail = |name: &str| details.get(name).and_then(|v| v.as_str()).map(str::to_owned);
            let error_type = detail("type").unwrap_or_else(|| "unknown".into());
            let error_code = detail("code").unwrap_or_else(|| "unknown".into());
            let message = detail("message").unwrap_or_default();
            error!(
                call_connection_id = %call_connection_id,
                error_type = %error_type,
                error_code = %error_code,
                message = %message,
                "Realtime backend error"
            );
        }
        other => {
            debug!(call_connection_id = %call_connection_id, event_type = %other, "Realtime event");
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: RealtimeProvider) -> RealtimeConfig {
        RealtimeConfig {
            provider,
            endpoint: "https://x".into(),
            api_key: "k".into(),
            deployment: "d".into(),
            api_version: "v".into(),
            voice: "en-US-Emma2:DragonHDLatestNeural".into(),
            hangup_on_goodbye: true,
        }
    }

    #[test]
    fn test_voice_live_session_update() {
        let update = session_update(&config(RealtimeProvider::VoiceLive), "Be nice");
        assert_eq!(update["type"], "session.update");
        let session = &update["session"];
        assert_eq!(session["instructions"], "Be nice");
        assert_eq!(session["turn_detection"]["threshold"], 0.5);
        assert_eq!(session["turn_detection"]["prefix_padding_ms"], 200);
        assert_eq!(session["turn_detection"]["silence_duration_ms"], 200);
        assert_eq!(
            session["turn_detection"]["end_of_utterance_detection"]["threshold"],
            0.01
        );
        assert_eq!(
            session["input_audio_noise_reduction"]["type"],
            "azure_deep_noise_suppression"
        );
        assert_eq!(
            session["input_audio_echo_cancellation"]["type"],
            "server_echo_cancellation"
        );
        assert_eq!(session["voice"]["name"], "en-US-Emma2:DragonHDLatestNeural");
        assert_eq!(session["voice"]["temperature"], 0.8);
    }

    #[test]
    fn test_openai_session_update() {
        let mut cfg = config(RealtimeProvider::AzureOpenAi);
        cfg.voice = "alloy".into();
        let session = &session_update(&cfg, "x")["session"];
        assert_eq!(session["input_audio_format"], "pcm16");
        assert_eq!(session["output_audio_format"], "pcm16");
        assert_eq!(session["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["voice"], "alloy");
    }

    #[test]
    fn test_audio_delta_and_barge_in() {
        let outcome = map_server_event(
            &json!({"type": "response.audio.delta", "delta": "AAAA"}),
            "c",
        );
        assert_eq!(outcome.frame, Some(OutboundFrame::audio("AAAA")));

        let outcome = map_server_event(&json!({"type": "input_audio_buffer.speech_started"}), "c");
        assert_eq!(outcome.frame, Some(OutboundFrame::stop_audio()));
    }

    #[test]
    fn test_transcripts() {
        let user = map_server_event(
            &json!({"type": "conversation.item.input_audio_transcription.completed",
                    "transcript": " I'd like to go to Rome "}),
            "c",
        );
        assert_eq!(
            user.transcript,
            Some((TranscriptRole::User, "I'd like to go to Rome".into()))
        );
        assert!(!user.goodbye_detected);

        let bye = map_server_event(
            &json!({"type": "response.audio_transcript.done",
                    "transcript": "Thanks for calling. Goodbye!"}),
            "c",
        );
        assert_eq!(bye.transcript.as_ref().map(|t| t.0), Some(TranscriptRole::Assistant));
        assert!(bye.goodbye_detected);

        let empty = map_server_event(
            &json!({"type": "response.audio_transcript.done", "transcript": "  "}),
            "c",
        );
        assert_eq!(empty, EventOutcome::default());
    }

    #[test]
    fn test_response_done_and_unknown() {
        assert!(map_server_event(&json!({"type": "response.done"}), "c").response_done);
        assert_eq!(
            map_server_event(&json!({"type": "session.created"}), "c"),
            EventOutcome::default()
        );
        assert_eq!(
            map_server_event(&json!({"type": "error", "error": {"code": "x"}}), "c"),
            EventOutcome::default()
        );
    }
}
