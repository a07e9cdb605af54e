//! Configuration module for the call automation service
//!
//! This module handles server configuration from two sources: YAML files and
//! environment variables. Environment variables always override YAML values.
//! The configuration is split into logical submodules:
//!
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use acs_voice_agent::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub(crate) const DEFAULT_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_PORT: u16 = 8000;
pub(crate) const DEFAULT_VOICE_NAME: &str = "en-US-NancyNeural";
pub(crate) const DEFAULT_END_SILENCE_TIMEOUT: f64 = 0.5;
pub(crate) const DEFAULT_PERSONA: &str = "default";
pub(crate) const DEFAULT_MAX_RECOGNIZE_RETRY: u32 = 2;
pub(crate) const DEFAULT_OPENAI_DEPLOYMENT: &str = "gpt-4o-mini";
pub(crate) const DEFAULT_OPENAI_API_VERSION: &str = "2024-08-01-preview";
pub(crate) const DEFAULT_REALTIME_DEPLOYMENT: &str = "gpt-4o-realtime-preview";
pub(crate) const DEFAULT_VOICE_LIVE_API_VERSION: &str = "2025-05-01-preview";
pub(crate) const DEFAULT_VOICE_LIVE_VOICE: &str = "en-US-Emma2:DragonHDLatestNeural";
pub(crate) const DEFAULT_CACHE_TTL_SECONDS: u64 = 24 * 60 * 60;
pub(crate) const DEFAULT_COSMOS_DATABASE: &str = "callautomation";
pub(crate) const DEFAULT_COSMOS_CONTAINER: &str = "sessions";

/// Which conversational backend drives a connected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiBackend {
    /// Azure Voice Live realtime session fed by ACS media streaming
    #[default]
    VoiceLive,
    /// Azure OpenAI realtime endpoint fed by ACS media streaming
    OpenAiRealtime,
    /// ACS recognize/play with a chat completion per turn
    Pipeline,
}

impl AiBackend {
    /// Realtime backends need ACS to open a media WebSocket back to us.
    pub fn uses_media_streaming(&self) -> bool {
        !matches!(self, AiBackend::Pipeline)
    }
}

impl FromStr for AiBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "voice_live" | "voicelive" => Ok(AiBackend::VoiceLive),
            "openai_realtime" | "realtime" => Ok(AiBackend::OpenAiRealtime),
            "pipeline" | "openai" | "traditional" => Ok(AiBackend::Pipeline),
            other => Err(format!(
                "Unknown AI_BACKEND '{other}'. Expected voice_live, openai_realtime or pipeline"
            )),
        }
    }
}

impl fmt::Display for AiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AiBackend::VoiceLive => "voice_live",
            AiBackend::OpenAiRealtime => "openai_realtime",
            AiBackend::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

/// Server configuration
///
/// Contains everything needed to run the service:
/// - Server settings (host, port)
/// - ACS call automation settings
/// - Conversation behaviour (backend, persona, retries)
/// - Azure OpenAI and Voice Live credentials
/// - Session cache (Redis) and session store (Cosmos DB)
/// - Authentication for the outbound call trigger
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // ACS call automation
    pub acs_connection_string: Option<String>,
    pub cognitive_service_endpoint: Option<String>,
    pub agent_phone_number: Option<String>,
    pub target_phone_number: Option<String>,
    pub voice_name: String,
    pub callback_uri_host: Option<String>,
    pub end_silence_timeout: f64,

    // Conversation
    pub ai_backend: AiBackend,
    pub agent_persona: String,
    pub max_recognize_retry: u32,
    pub hangup_on_goodbye: bool,

    // Azure OpenAI
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_key: Option<String>,
    pub azure_openai_deployment: String,
    pub azure_openai_api_version: String,
    pub azure_openai_realtime_deployment: String,

    // Azure Voice Live
    pub voice_live_endpoint: Option<String>,
    pub voice_live_api_key: Option<String>,
    pub voice_live_deployment: String,
    pub voice_live_api_version: String,
    pub voice_live_voice: String,

    // Session cache (Redis, or memory when unset)
    pub redis_url: Option<String>,
    pub redis_password: Option<String>,
    pub cache_ttl_seconds: Option<u64>,

    // Session store (Cosmos DB, disabled when unset)
    pub cosmos_db_url: Option<String>,
    pub cosmos_db_key: Option<String>,
    pub cosmos_db_database: String,
    pub cosmos_db_container: String,

    // Authentication configuration
    pub auth_api_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            acs_connection_string: None,
            cognitive_service_endpoint: None,
            agent_phone_number: None,
            target_phone_number: None,
            voice_name: DEFAULT_VOICE_NAME.to_string(),
            callback_uri_host: None,
            end_silence_timeout: DEFAULT_END_SILENCE_TIMEOUT,
            ai_backend: AiBackend::default(),
            agent_persona: DEFAULT_PERSONA.to_string(),
            max_recognize_retry: DEFAULT_MAX_RECOGNIZE_RETRY,
            hangup_on_goodbye: true,
            azure_openai_endpoint: None,
            azure_openai_key: None,
            azure_openai_deployment: DEFAULT_OPENAI_DEPLOYMENT.to_string(),
            azure_openai_api_version: DEFAULT_OPENAI_API_VERSION.to_string(),
            azure_openai_realtime_deployment: DEFAULT_REALTIME_DEPLOYMENT.to_string(),
            voice_live_endpoint: None,
            voice_live_api_key: None,
            voice_live_deployment: DEFAULT_REALTIME_DEPLOYMENT.to_string(),
            voice_live_api_version: DEFAULT_VOICE_LIVE_API_VERSION.to_string(),
            voice_live_voice: DEFAULT_VOICE_LIVE_VOICE.to_string(),
            redis_url: None,
            redis_password: None,
            cache_ttl_seconds: Some(DEFAULT_CACHE_TTL_SECONDS),
            cosmos_db_url: None,
            cosmos_db_key: None,
            cosmos_db_database: DEFAULT_COSMOS_DATABASE.to_string(),
            cosmos_db_container: DEFAULT_COSMOS_CONTAINER.to_string(),
            auth_api_secret: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// The `.env` file is not read here; the YAML file is the source of truth
    /// and only real environment variables override it.
    ///
    /// # Errors
    /// Returns an error if the YAML file cannot be read or is malformed, if an
    /// environment variable has an invalid format, or if validation fails.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if API secret authentication is configured
    pub fn has_api_secret_auth(&self) -> bool {
        self.auth_api_secret.is_some()
    }

    /// Whether transcripts should be persisted to Cosmos DB
    pub fn has_cosmos(&self) -> bool {
        self.cosmos_db_url.is_some() && self.cosmos_db_key.is_some()
    }

    /// Callback URI handed to ACS for mid-call events of one call.
    ///
    /// Returns `None` when `CALLBACK_URI_HOST` is not configured.
    pub fn callback_events_uri(&self, context_id: &str) -> Option<String> {
        let host = self.callback_uri_host.as_deref()?.trim_end_matches('/');
        Some(format!("{host}/api/callbacks/{context_id}"))
    }

    /// WebSocket URI ACS connects to for bidirectional media streaming.
    pub fn media_websocket_uri(&self, id: &str) -> Option<String> {
        let host = self.callback_uri_host.as_deref()?.trim_end_matches('/');
        let ws_host = if let Some(rest) = host.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = host.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{host}")
        };
        Some(format!("{ws_host}/ws/{id}"))
    }

    /// Redis URL with `REDIS_PASSWORD` applied when the URL carries none.
    pub fn redis_url_with_password(&self) -> Option<String> {
        let raw = self.redis_url.as_ref()?;
        let Some(password) = self.redis_password.as_deref() else {
            return Some(raw.clone());
        };

        match url::Url::parse(raw) {
            Ok(mut parsed) if parsed.password().is_none() => {
                if parsed.set_password(Some(password)).is_err() {
                    return Some(raw.clone());
                }
                Some(parsed.to_string())
            }
            _ => Some(raw.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_ai_backend_parsing() {
        assert_eq!("voice_live".parse::<AiBackend>(), Ok(AiBackend::VoiceLive));
        assert_eq!("Voice-Live".parse::<AiBackend>(), Ok(AiBackend::VoiceLive));
        assert_eq!(
            "openai_realtime".parse::<AiBackend>(),
            Ok(AiBackend::OpenAiRealtime)
        );
        assert_eq!("pipeline".parse::<AiBackend>(), Ok(AiBackend::Pipeline));
        assert!("carrier-pigeon".parse::<AiBackend>().is_err());
    }

    #[test]
    fn test_ai_backend_media_streaming() {
        assert!(AiBackend::VoiceLive.uses_media_streaming());
        assert!(AiBackend::OpenAiRealtime.uses_media_streaming());
        assert!(!AiBackend::Pipeline.uses_media_streaming());
    }

    #[test]
    fn test_callback_and_media_uris() {
        let config = ServerConfig {
            callback_uri_host: Some("https://agent.example.com/".to_string()),
            ..Default::default()
        };

        assert_eq!(
            config.callback_events_uri("abc").as_deref(),
            Some("https://agent.example.com/api/callbacks/abc")
        );
        assert_eq!(
            config.media_websocket_uri("abc").as_deref(),
            Some("wss://agent.example.com/ws/abc")
        );

        let local = ServerConfig {
            callback_uri_host: Some("http://localhost:8000".to_string()),
            ..Default::default()
        };
        assert_eq!(
            local.media_websocket_uri("x").as_deref(),
            Some("ws://localhost:8000/ws/x")
        );

        let missing = ServerConfig::default();
        assert!(missing.callback_events_uri("abc").is_none());
        assert!(missing.media_websocket_uri("abc").is_none());
    }

    #[test]
    fn test_redis_url_with_password() {
        let config = ServerConfig {
            redis_url: Some("rediss://cache.example.com:6380".to_string()),
            redis_password: Some("s3cret".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.redis_url_with_password().as_deref(),
            Some("rediss://:s3cret@cache.example.com:6380")
        );

        let embedded = ServerConfig {
            redis_url: Some("redis://:inline@localhost:6379".to_string()),
            redis_password: Some("other".to_string()),
            ..Default::default()
        };
        assert_eq!(
            embedded.redis_url_with_password().as_deref(),
            Some("redis://:inline@localhost:6379")
        );

        assert!(ServerConfig::default().redis_url_with_password().is_none());
    }

    #[test]
    fn test_has_cosmos_requires_url_and_key() {
        let mut config = ServerConfig {
            cosmos_db_url: Some("https://db.documents.azure.com:443/".to_string()),
            ..Default::default()
        };
        assert!(!config.has_cosmos());
        config.cosmos_db_key = Some("a2V5".to_string());
        assert!(config.has_cosmos());
    }

    #[test]
    #[serial]
    fn test_from_file_env_overrides_yaml() {
        unsafe {
            env::remove_var("PORT");
            env::remove_var("AI_BACKEND");
            env::set_var("VOICE_NAME", "en-GB-SoniaNeural");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  port: 9000
acs:
  voice_name: "en-US-JennyNeural"
  callback_uri_host: "https://agent.example.com"
conversation:
  backend: "pipeline"
openai:
  endpoint: "https://oai.example.com"
  api_key: "key"
"#,
        )
        .unwrap();

        let config = ServerConfig::from_file(&config_path).expect("Should load config");
        assert_eq!(config.port, 9000);
        assert_eq!(config.voice_name, "en-GB-SoniaNeural");
        assert_eq!(config.ai_backend, AiBackend::Pipeline);
        assert_eq!(
            config.callback_uri_host.as_deref(),
            Some("https://agent.example.com")
        );

        unsafe {
            env::remove_var("VOICE_NAME");
        }
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_incomplete_backend() {
        unsafe {
            env::remove_var("AI_BACKEND");
            env::remove_var("AZURE_OPENAI_SERVICE_ENDPOINT");
            env::remove_var("AZURE_OPENAI_SERVICE_KEY");
        }

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
conversation:
  backend: "pipeline"
"#,
        )
        .unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("AZURE_OPENAI_SERVICE_ENDPOINT")
        );
    }
}
