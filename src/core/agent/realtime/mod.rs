//! Realtime audio-to-audio sessions (Azure Voice Live or Azure OpenAI realtime).
//!
//! Each call gets one outbound WebSocket to the model. Caller audio arriving
//! on the ACS media socket is appended to the model's input buffer, and model
//! audio is framed for ACS and pushed back through a [`MediaSink`].

pub mod events;
pub mod session;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use super::media::OutboundFrame;
use crate::config::{AiBackend, ServerConfig};

pub use events::{EventOutcome, TranscriptRole, map_server_event, session_update};
pub use session::{RealtimeSessionManager, SessionHandle};

/// Azure OpenAI realtime API version
pub const OPENAI_REALTIME_API_VERSION: &str = "2024-10-01-preview";
/// Voice used on the Azure OpenAI realtime endpoint
pub const OPENAI_REALTIME_VOICE: &str = "alloy";

/// Frames headed for the ACS media WebSocket of one call.
pub type MediaSink = mpsc::UnboundedSender<OutboundFrame>;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Realtime backend is not configured")]
    NotConfigured,
    #[error("Invalid realtime endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("No realtime session for call {0}")]
    SessionNotFound(String),
    #[error("Realtime session for call {0} is closed")]
    SessionClosed(String),
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeProvider {
    VoiceLive,
    AzureOpenAi,
}

#[derive(Clone)]
pub struct RealtimeConfig {
    pub provider: RealtimeProvider,
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub voice: String,
    pub hangup_on_goodbye: bool,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("voice", &self.voice)
            .finish()
    }
}

impl RealtimeConfig {
    /// Realtime settings for the configured backend, `None` in pipeline mode.
    pub fn from_server_config(config: &ServerConfig) -> Option<Self> {
        match config.ai_backend {
            AiBackend::VoiceLive => Some(Self {
                provider: RealtimeProvider::VoiceLive,
                endpoint: config.voice_live_endpoint.clone()?,
                api_key: config.voice_live_api_key.clone()?,
                deployment: config.voice_live_deployment.clone(),
                api_version: config.voice_live_api_version.clone(),
                voice: config.voice_live_voice.clone(),
                hangup_on_goodbye: config.hangup_on_goodbye,
            }),
            AiBackend::OpenAiRealtime => Some(Self {
                provider: RealtimeProvider::AzureOpenAi,
                endpoint: config.azure_openai_endpoint.clone()?,
                api_key: config.azure_openai_key.clone()?,
                deployment: config.azure_openai_realtime_deployment.clone(),
                api_version: OPENAI_REALTIME_API_VERSION.to_string(),
                voice: OPENAI_REALTIME_VOICE.to_string(),
                hangup_on_goodbye: config.hangup_on_goodbye,
            }),
            AiBackend::Pipeline => None,
        }
    }

    /// WebSocket URL of the realtime endpoint.
    pub fn websocket_url(&self) -> RealtimeResult<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(RealtimeError::InvalidEndpoint(format!(
                    "unsupported scheme: {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| RealtimeError::InvalidEndpoint(self.endpoint.clone()))?;

        let path = match self.provider {
            RealtimeProvider::VoiceLive => "voice-live/realtime",
            RealtimeProvider::AzureOpenAi => "openai/realtime",
        };
        let mut url = url
            .join(path)
            .map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))?;

        let model_param = match self.provider {
            RealtimeProvider::VoiceLive => "model",
            RealtimeProvider::AzureOpenAi => "deployment",
        };
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version)
            .append_pair(model_param, &self.deployment);
        Ok(url)
    }
}

/// Seam between the media bridge and a realtime model.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    /// Connect to the model for `call_connection_id` and configure the session.
    async fn start_session(
        &self,
        call_connection_id: &str,
        instructions: String,
        sink: MediaSink,
    ) -> RealtimeResult<SessionHandle>;

    /// Append one base64 PCM chunk of caller audio.
    async fn forward_audio(&self, call_connection_id: &str, audio_base64: &str)
    -> RealtimeResult<()>;

    /// Close the model connection. Unknown ids are ignored.
    async fn close_session(&self, call_connection_id: &str);

    fn has_session(&self, call_connection_id: &str) -> bool;
}
