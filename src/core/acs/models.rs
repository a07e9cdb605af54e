//! Wire types for the ACS Call Automation REST API (api-version 2024-09-15).

use serde::{Deserialize, Serialize};

/// Identifier of a call participant.
///
/// ACS sends and accepts several shapes; only the fields this service reads
/// or writes are modelled, the rest are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationIdentifier {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<PhoneNumberIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_user: Option<CommunicationUserIdentifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumberIdentifier {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunicationUserIdentifier {
    pub id: String,
}

impl CommunicationIdentifier {
    /// PSTN participant identified by an E.164 number
    pub fn phone_number(number: impl Into<String>) -> Self {
        let number = number.into();
        Self {
            raw_id: Some(format!("4:{number}")),
            kind: Some("phoneNumber".to_string()),
            phone_number: Some(PhoneNumberIdentifier { value: number }),
            communication_user: None,
        }
    }

    /// Phone number of this identifier, from the typed field or the raw id.
    pub fn phone_value(&self) -> Option<&str> {
        if let Some(phone) = &self.phone_number {
            return Some(phone.value.as_str());
        }
        self.raw_id.as_deref().and_then(|raw| raw.strip_prefix("4:"))
    }
}

/// Bidirectional media streaming to a WebSocket we host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamingOptions {
    pub transport_url: String,
    pub transport_type: String,
    pub content_type: String,
    pub audio_channel_type: String,
    pub start_media_streaming: bool,
    pub enable_bidirectional: bool,
    pub audio_format: String,
}

impl MediaStreamingOptions {
    /// Mixed-channel PCM 24 kHz mono audio in both directions, started on connect.
    pub fn bidirectional_pcm24k(transport_url: impl Into<String>) -> Self {
        Self {
            transport_url: transport_url.into(),
            transport_type: "websocket".to_string(),
            content_type: "audio".to_string(),
            audio_channel_type: "mixed".to_string(),
            start_media_streaming: true,
            enable_bidirectional: true,
            audio_format: "Pcm24KMono".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIntelligenceOptions {
    pub cognitive_services_endpoint: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCallRequest {
    pub incoming_call_context: String,
    pub callback_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_intelligence_options: Option<CallIntelligenceOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_streaming_options: Option<MediaStreamingOptions>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub targets: Vec<CommunicationIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_caller_id_number: Option<PhoneNumberIdentifier>,
    pub callback_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_intelligence_options: Option<CallIntelligenceOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_streaming_options: Option<MediaStreamingOptions>,
}

/// Subset of the call connection resource returned by answer/create/get.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallConnectionProperties {
    pub call_connection_id: String,
    pub server_call_id: Option<String>,
    pub call_connection_state: Option<String>,
    pub callback_uri: Option<String>,
    pub correlation_id: Option<String>,
    pub targets: Vec<CommunicationIdentifier>,
    pub source: Option<CommunicationIdentifier>,
    pub source_caller_id_number: Option<PhoneNumberIdentifier>,
    pub answered_by: Option<CommunicationIdentifier>,
}

/// Text-to-speech prompt rendered by ACS through Cognitive Services.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaySource {
    pub kind: String,
    pub text: TextSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSource {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_locale: Option<String>,
}

impl PlaySource {
    pub fn text(text: impl Into<String>, voice_name: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: TextSource {
                text: text.into(),
                voice_name: Some(voice_name.into()),
                source_locale: Some("en-US".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub play_sources: Vec<PlaySource>,
    /// Empty means every participant hears the prompt.
    pub play_to: Vec<CommunicationIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechOptions {
    pub end_silence_timeout_in_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeOptions {
    pub interrupt_prompt: bool,
    pub initial_silence_timeout_in_seconds: u32,
    pub target_participant: CommunicationIdentifier,
    pub speech_options: SpeechOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeRequest {
    pub recognize_input_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_prompt: Option<PlaySource>,
    pub interrupt_call_media_operation: bool,
    pub recognize_options: RecognizeOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_context: Option<String>,
}

/// Error body returned by ACS on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AcsErrorBody {
    pub error: AcsErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AcsErrorDetail {
    pub code: String,
    pub message: String,
}
