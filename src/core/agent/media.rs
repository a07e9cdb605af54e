//! ACS bidirectional media streaming frames.
//!
//! Inbound frames use camelCase (`{"kind":"AudioData","audioData":{...}}`),
//! outbound frames PascalCase (`{"Kind":"AudioData","AudioData":{"Data":..}}`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDataPayload {
    /// Base64 PCM 24 kHz mono
    pub data: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "participantRawID")]
    pub participant_raw_id: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DtmfData {
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInboundFrame {
    #[serde(alias = "Kind")]
    kind: String,
    #[serde(default, alias = "AudioData")]
    audio_data: Option<AudioDataPayload>,
    #[serde(default, alias = "AudioMetadata")]
    audio_metadata: Option<AudioMetadata>,
    #[serde(default, alias = "DtmfData")]
    dtmf_data: Option<DtmfData>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Audio(AudioDataPayload),
    Metadata(AudioMetadata),
    Dtmf(DtmfData),
    Other(String),
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let RawInboundFrame {
            kind,
            audio_data,
            audio_metadata,
            dtmf_data,
        } = serde_json::from_str(text)?;

        Ok(match (kind.as_str(), audio_data, audio_metadata, dtmf_data) {
            ("AudioData", Some(audio), _, _) => InboundFrame::Audio(audio),
            ("AudioMetadata", _, Some(meta), _) => InboundFrame::Metadata(meta),
            ("DtmfData", _, _, Some(dtmf)) => InboundFrame::Dtmf(dtmf),
            _ => InboundFrame::Other(kind.clone()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundAudio {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopAudio {}

/// Frame written back to ACS on the media WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundFrame {
    pub kind: &'static str,
    pub audio_data: Option<OutboundAudio>,
    pub stop_audio: Option<StopAudio>,
}

impl OutboundFrame {
    pub fn audio(data: impl Into<String>) -> Self {
        Self {
            kind: "AudioData",
            audio_data: Some(OutboundAudio { data: data.into() }),
            stop_audio: None,
        }
    }

    /// Tells ACS to drop queued playback (barge-in).
    pub fn stop_audio() -> Self {
        Self {
            kind: "StopAudio",
            audio_data: None,
            stop_audio: Some(StopAudio {}),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
