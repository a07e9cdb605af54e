//! EventGrid and ACS callback envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::core::acs::CommunicationIdentifier;

/// `resultInformation.subCode` ACS reports when nobody spoke before the
/// initial silence timeout.
pub const SUB_CODE_INITIAL_SILENCE_TIMEOUT: i64 = 8510;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AcsEventType {
    SubscriptionValidation,
    IncomingCall,
    CallConnected,
    CallDisconnected,
    ParticipantsUpdated,
    RecognizeCompleted,
    RecognizeFailed,
    PlayCompleted,
    PlayFailed,
    MediaStreamingStarted,
    MediaStreamingStopped,
    MediaStreamingFailed,
    Unknown(String),
}

impl AcsEventType {
    pub fn parse(event_type: &str) -> Self {
        if event_type == "Microsoft.EventGrid.SubscriptionValidationEvent" {
            return AcsEventType::SubscriptionValidation;
        }
        match event_type.strip_prefix("Microsoft.Communication.") {
            Some("IncomingCall") => AcsEventType::IncomingCall,
            Some("CallConnected") => AcsEventType::CallConnected,
            Some("CallDisconnected") => AcsEventType::CallDisconnected,
            Some("ParticipantsUpdated") => AcsEventType::ParticipantsUpdated,
            Some("RecognizeCompleted") => AcsEventType::RecognizeCompleted,
            Some("RecognizeFailed") => AcsEventType::RecognizeFailed,
            Some("PlayCompleted") => AcsEventType::PlayCompleted,
            Some("PlayFailed") => AcsEventType::PlayFailed,
            Some("MediaStreamingStarted") => AcsEventType::MediaStreamingStarted,
            Some("MediaStreamingStopped") => AcsEventType::MediaStreamingStopped,
            Some("MediaStreamingFailed") => AcsEventType::MediaStreamingFailed,
            _ => AcsEventType::Unknown(event_type.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AcsEventType::SubscriptionValidation => {
                "Microsoft.EventGrid.SubscriptionValidationEvent"
            }
            AcsEventType::IncomingCall => "Microsoft.Communication.IncomingCall",
            AcsEventType::CallConnected => "Microsoft.Communication.CallConnected",
            AcsEventType::CallDisconnected => "Microsoft.Communication.CallDisconnected",
            AcsEventType::ParticipantsUpdated => "Microsoft.Communication.ParticipantsUpdated",
            AcsEventType::RecognizeCompleted => "Microsoft.Communication.RecognizeCompleted",
            AcsEventType::RecognizeFailed => "Microsoft.Communication.RecognizeFailed",
            AcsEventType::PlayCompleted => "Microsoft.Communication.PlayCompleted",
            AcsEventType::PlayFailed => "Microsoft.Communication.PlayFailed",
            AcsEventType::MediaStreamingStarted => "Microsoft.Communication.MediaStreamingStarted",
            AcsEventType::MediaStreamingStopped => "Microsoft.Communication.MediaStreamingStopped",
            AcsEventType::MediaStreamingFailed => "Microsoft.Communication.MediaStreamingFailed",
            AcsEventType::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for AcsEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EventGrid schema event (`eventType`); CloudEvents `type` is accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGridEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "type")]
    pub event_type: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl EventGridEvent {
    pub fn kind(&self) -> AcsEventType {
        AcsEventType::parse(&self.event_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionValidationData {
    pub validation_code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallData {
    pub to: CommunicationIdentifier,
    pub from: CommunicationIdentifier,
    pub incoming_call_context: String,
    #[serde(default)]
    pub caller_display_name: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// CloudEvent posted to `/api/callbacks`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub data: CallEventData,
}

impl CallbackEvent {
    pub fn kind(&self) -> AcsEventType {
        AcsEventType::parse(&self.event_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResultInformation {
    pub code: i64,
    pub sub_code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeechResult {
    pub speech: String,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DtmfResult {
    pub tones: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Participant {
    pub identifier: CommunicationIdentifier,
    pub is_muted: bool,
}

/// Union of the `data` fields of the call events this service handles.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallEventData {
    pub call_connection_id: Option<String>,
    pub server_call_id: Option<String>,
    pub correlation_id: Option<String>,
    pub operation_context: Option<String>,
    pub result_information: Option<ResultInformation>,
    pub recognition_type: Option<String>,
    pub speech_result: Option<SpeechResult>,
    pub dtmf_result: Option<DtmfResult>,
    pub participants: Vec<Participant>,
}

impl CallEventData {
    pub fn sub_code(&self) -> Option<i64> {
        self.result_information.as_ref().map(|r| r.sub_code)
    }
}

/// Parse a webhook body holding one event or an array of them.
///
/// Elements of an array that do not deserialize are logged and skipped so
/// one unrecognized event does not drop the rest of the batch. A body that
/// is not JSON, or a single event that does not deserialize, is an error.
pub fn parse_event_batch<T: serde::de::DeserializeOwned>(
    body: &[u8],
) -> Result<Vec<T>, serde_json::Error> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed event in batch");
                    None
                }
            })
            .collect()),
        single => Ok(vec![serde_json::from_value(single)?]),
    }
}
