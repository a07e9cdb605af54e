//! Durable call transcripts.
//!
//! One document per call connection, partitioned by caller id. Cosmos DB in
//! production; an in-process map when Cosmos is not configured.

pub mod cosmos;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cosmos::{CosmosConfig, CosmosSessionStore};
pub use memory::MemorySessionStore;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Cosmos DB returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Session {0} was modified concurrently")]
    Conflict(String),
    #[error("Request pool error: {0}")]
    Pool(String),
}

pub type SessionStoreResult<T> = Result<T, SessionStoreError>;

/// One utterance in a call transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    /// `user`, `assistant` or `application`
    pub sender: String,
    pub message: String,
}

/// Transcript document for one call connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub id: String,
    pub caller_id: String,
    pub call_start_time: DateTime<Utc>,
    pub call_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conversation: Vec<ConversationEntry>,
    #[serde(default)]
    pub user_details: serde_json::Map<String, serde_json::Value>,
}

impl CallSession {
    pub fn new(call_connection_id: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            id: call_connection_id.into(),
            caller_id: caller_id.into(),
            call_start_time: Utc::now(),
            call_end_time: None,
            conversation: Vec::new(),
            user_details: serde_json::Map::new(),
        }
    }

    pub fn push(&mut self, sender: &str, message: &str) {
        self.conversation.push(ConversationEntry {
            timestamp: Utc::now(),
            sender: sender.to_string(),
            message: message.to_string(),
        });
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a transcript for a call. Recreating an existing id is a no-op.
    async fn create_session(
        &self,
        call_connection_id: &str,
        caller_id: &str,
    ) -> SessionStoreResult<CallSession>;

    /// Append one utterance. Fails with `SessionNotFound` for unknown ids.
    async fn append_message(
        &self,
        call_connection_id: &str,
        sender: &str,
        message: &str,
    ) -> SessionStoreResult<()>;

    /// Stamp `callEndTime`.
    async fn close_session(&self, call_connection_id: &str) -> SessionStoreResult<()>;

    async fn get_session(&self, call_connection_id: &str) -> SessionStoreResult<CallSession>;

    fn store_type(&self) -> &'static str;
}
