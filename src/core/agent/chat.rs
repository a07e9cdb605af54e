//! Chat completions for the pipeline backend.
//!
//! Conversation history is kept in the session cache so any instance can
//! pick up the next turn of a call.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::prompts::{AgentPersona, MAX_REPLY_CHARS, SYSTEM_TROUBLE};
use crate::core::cache::{CacheError, CacheStore, keys};
use crate::utils::req_manager::ReqManager;

const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Azure OpenAI is not configured")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Azure OpenAI returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Completion had no content")]
    EmptyResponse,
    #[error("Request pool error: {0}")]
    Pool(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Structured reply the personas are asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub msg: String,
    pub intent: String,
}

/// Parse `{"msg","intent"}` out of a model reply.
///
/// Tolerates markdown code fences and the older `context` key. Anything that
/// is not a JSON object with a `msg` becomes `{msg: raw, intent: context}`.
pub fn parse_agent_reply(raw: &str, context: &str) -> AgentReply {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(unfenced)
        && let Some(msg) = map.get("msg").and_then(Value::as_str)
    {
        let intent = map
            .get("intent")
            .or_else(|| map.get("context"))
            .and_then(Value::as_str)
            .unwrap_or(context);
        return AgentReply {
            msg: msg.to_string(),
            intent: intent.to_string(),
        };
    }

    AgentReply {
        msg: raw.to_string(),
        intent: context.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

pub struct ChatService {
    config: Option<ChatConfig>,
    persona: AgentPersona,
    cache: Arc<CacheStore>,
    req_manager: Arc<ReqManager>,
}

impl ChatService {
    pub fn new(
        config: Option<ChatConfig>,
        persona: AgentPersona,
        cache: Arc<CacheStore>,
        req_manager: Arc<ReqManager>,
    ) -> Self {
        Self {
            config,
            persona,
            cache,
            req_manager,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn persona(&self) -> AgentPersona {
        self.persona
    }

    pub async fn history(&self, call_connection_id: &str) -> ChatResult<Vec<ChatMessage>> {
        Ok(self
            .cache
            .get_json::<Vec<ChatMessage>>(keys::chat_history(call_connection_id))
            .await?
            .unwrap_or_default())
    }

    /// Reset the history to `persona`, optionally seeding one exchange.
    pub async fn update_agent_persona(
        &self,
        call_connection_id: &str,
        persona: AgentPersona,
        user_message: Option<&str>,
        assistant_message: Option<&str>,
    ) -> ChatResult<()> {
        let mut history = vec![ChatMessage::system(persona.system_prompt())];
        if let Some(user) = user_message {
            history.push(ChatMessage::user(user));
        }
        if let Some(assistant) = assistant_message {
            history.push(ChatMessage::assistant(assistant));
        }

        self.cache
            .set_json(keys::chat_history(call_connection_id), &history)
            .await?;
        info!(
            call_connection_id = %call_connection_id,
            persona = %persona,
            "Agent persona set"
        );
        Ok(())
    }

    /// Next assistant turn for `prompt`, or an apology when the model is unreachable.
    pub async fn get_chat_completion(&self, call_connection_id: &str, prompt: &str) -> String {
        match self.try_chat_completion(call_connection_id, prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    call_connection_id = %call_connection_id,
                    error = %e,
                    "Chat completion failed"
                );
                SYSTEM_TROUBLE.to_string()
            }
        }
    }

    pub async fn try_chat_completion(
        &self,
        call_connection_id: &str,
        prompt: &str,
    ) -> ChatResult<String> {
        let config = self.config.as_ref().ok_or(ChatError::NotConfigured)?;

        let mut history = self.history(call_connection_id).await?;
        if history.is_empty() {
            history.push(ChatMessage::system(self.persona.system_prompt()));
        }
        history.push(ChatMessage::user(format!(
            "In less than {MAX_REPLY_CHARS} characters and being succint: {prompt}"
        )));

        let mut url = Url::parse(&config.endpoint)
            .and_then(|base| {
                base.join(&format!(
                    "openai/deployments/{}/chat/completions",
                    config.deployment
                ))
            })
            .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("api-version", &config.api_version);

        let body = json!({
            "messages": history,
            "max_tokens": MAX_TOKENS,
        });

        let guard = self
            .req_manager
            .acquire()
            .await
            .map_err(|e| ChatError::Pool(e.to_string()))?;
        let result = guard
            .client()
            .post(url)
            .header("api-key", &config.api_key)
            .json(&body)
            .send()
            .await;
        guard.record(&result);
        let response = result?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ChatError::Api { status, message });
        }

        let completion: CompletionResponse = response.json().await?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ChatError::EmptyResponse)?;

        debug!(call_connection_id = %call_connection_id, reply = %reply, "Chat completion");

        history.push(ChatMessage::assistant(reply.clone()));
        self.cache
            .set_json(keys::chat_history(call_connection_id), &history)
            .await?;

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheConfig;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn cache() -> Arc<CacheStore> {
        Arc::new(
            CacheStore::from_config(CacheConfig::Memory {
                max_entries: 100,
                ttl_seconds: None,
            })
            .await
            .unwrap(),
        )
    }

    fn service(server: &MockServer, cache: Arc<CacheStore>) -> ChatService {
        ChatService::new(
            Some(ChatConfig {
                endpoint: format!("{}/", server.uri()),
                api_key: "test-key".into(),
                deployment: "gpt-4o-mini".into(),
                api_version: "2024-08-01-preview".into(),
            }),
            AgentPersona::Default,
            cache,
            Arc::new(ReqManager::new(2).unwrap()),
        )
    }

    #[test]
    fn test_parse_agent_reply() {
        let reply = parse_agent_reply(r#"{"msg": "Hi!", "intent": "endCall"}"#, "continueCall");
        assert_eq!(reply.msg, "Hi!");
        assert_eq!(reply.intent, "endCall");

        let fenced = parse_agent_reply(
            "```json\n{\"msg\": \"Sure\", \"intent\": \"continueCall\"}\n```",
            "doGreetingCall",
        );
        assert_eq!(fenced.msg, "Sure");
        assert_eq!(fenced.intent, "continueCall");

        let legacy = parse_agent_reply(r#"{"msg": "Ok", "context": "endCall"}"#, "continueCall");
        assert_eq!(legacy.intent, "endCall");

        let plain = parse_agent_reply("Just text", "continueCall");
        assert_eq!(plain.msg, "Just text");
        assert_eq!(plain.intent, "continueCall");

        let no_intent = parse_agent_reply(r#"{"msg": "Hello"}"#, "doGreetingCall");
        assert_eq!(no_intent.intent, "doGreetingCall");
    }

    #[tokio::test]
    async fn test_update_agent_persona_resets_history() {
        let server = MockServer::start().await;
        let cache = cache().await;
        let chat = service(&server, cache.clone());

        cache
            .set_json(
                keys::chat_history("c-1"),
                &vec![ChatMessage::user("stale")],
            )
            .await
            .unwrap();

        chat.update_agent_persona("c-1", AgentPersona::Intro, Some("info"), Some("hello"))
            .await
            .unwrap();

        let history = chat.history("c-1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, "system");
        assert!(history[0].content.contains("recruiting assistant"));
        assert_eq!(history[1], ChatMessage::user("info"));
        assert_eq!(history[2], ChatMessage::assistant("hello"));
    }

    #[tokio::test]
    async fn test_chat_completion_appends_both_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o-mini/chat/completions"))
            .and(query_param("api-version", "2024-08-01-preview"))
            .and(header("api-key", "test-key"))
            .and(body_partial_json(json!({"max_tokens": 1000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant",
                    "content": "{\"msg\": \"Where to?\", \"intent\": \"continueCall\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache().await;
        let chat = service(&server, cache);
        chat.update_agent_persona("c-1", AgentPersona::Default, None, None)
            .await
            .unwrap();

        let reply = chat.get_chat_completion("c-1", "I want a holiday").await;
        assert!(reply.contains("Where to?"));

        let history = chat.history("c-1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(
            history[1].content,
            "In less than 200 characters and being succint: I want a holiday"
        );
        assert_eq!(history[2].role, "assistant");
    }

    #[tokio::test]
    async fn test_chat_completion_falls_back_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let cache = cache().await;
        let chat = service(&server, cache);
        let reply = chat.get_chat_completion("c-2", "hello").await;
        assert_eq!(reply, SYSTEM_TROUBLE);

        // A failed turn leaves no history behind.
        assert!(chat.history("c-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_service() {
        let chat = ChatService::new(
            None,
            AgentPersona::Default,
            cache().await,
            Arc::new(ReqManager::new(1).unwrap()),
        );
        assert!(!chat.is_configured());
        assert!(matches!(
            chat.try_chat_completion("c", "hi").await,
            Err(ChatError::NotConfigured)
        ));
    }
}
