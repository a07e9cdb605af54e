//! ACS Call Automation client.
//!
//! `CallAutomation` is the seam the event dispatcher and call handler talk
//! to. `AcsCallAutomationClient` implements it over the REST API; the
//! `UnconfiguredCallAutomation` stand-in answers every operation with
//! `AcsError::NotConfigured` so the HTTP surface can still start without an
//! ACS resource.

pub mod auth;
pub mod client;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use auth::AcsCredentials;
pub use client::{ACS_API_VERSION, AcsCallAutomationClient};
pub use models::{
    AnswerCallRequest, CallConnectionProperties, CallIntelligenceOptions, CommunicationIdentifier,
    CreateCallRequest, MediaStreamingOptions, PhoneNumberIdentifier, PlayRequest, PlaySource,
    RecognizeOptions, RecognizeRequest, SpeechOptions,
};

/// Errors returned by call automation operations.
#[derive(Debug, Error)]
pub enum AcsError {
    #[error("Call automation not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid ACS connection string: {0}")]
    InvalidConnectionString(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ACS returned {status}: {code} {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request pool error: {0}")]
    Pool(String),
}

pub type AcsResult<T> = Result<T, AcsError>;

/// Operations this service performs against ACS Call Automation.
#[async_trait]
pub trait CallAutomation: Send + Sync {
    async fn answer_call(&self, request: AnswerCallRequest) -> AcsResult<CallConnectionProperties>;

    async fn create_call(&self, request: CreateCallRequest) -> AcsResult<CallConnectionProperties>;

    async fn get_call_properties(
        &self,
        call_connection_id: &str,
    ) -> AcsResult<CallConnectionProperties>;

    /// Play a prompt to every participant.
    async fn play_to_all(&self, call_connection_id: &str, request: PlayRequest) -> AcsResult<()>;

    async fn start_recognize(
        &self,
        call_connection_id: &str,
        request: RecognizeRequest,
    ) -> AcsResult<()>;

    /// Leave the call, or terminate it for every participant.
    async fn hang_up(&self, call_connection_id: &str, for_everyone: bool) -> AcsResult<()>;
}

/// Stand-in used when `ACS_CONNECTION_STRING` is not set.
pub struct UnconfiguredCallAutomation;

impl UnconfiguredCallAutomation {
    fn error<T>() -> AcsResult<T> {
        Err(AcsError::NotConfigured(
            "ACS_CONNECTION_STRING is not set".to_string(),
        ))
    }
}

#[async_trait]
impl CallAutomation for UnconfiguredCallAutomation {
    async fn answer_call(&self, _request: AnswerCallRequest) -> AcsResult<CallConnectionProperties> {
        Self::error()
    }

    async fn create_call(&self, _request: CreateCallRequest) -> AcsResult<CallConnectionProperties> {
        Self::error()
    }

    async fn get_call_properties(&self, _id: &str) -> AcsResult<CallConnectionProperties> {
        Self::error()
    }

    async fn play_to_all(&self, _id: &str, _request: PlayRequest) -> AcsResult<()> {
        Self::error()
    }

    async fn start_recognize(&self, _id: &str, _request: RecognizeRequest) -> AcsResult<()> {
        Self::error()
    }

    async fn hang_up(&self, _id: &str, _for_everyone: bool) -> AcsResult<()> {
        Self::error()
    }
}
