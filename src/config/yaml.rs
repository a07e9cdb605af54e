use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///
/// acs:
///   connection_string: "endpoint=https://acs.communication.azure.com/;accesskey=..."
///   cognitive_service_endpoint: "https://my-ai.cognitiveservices.azure.com/"
///   agent_phone_number: "+18005550100"
///   target_phone_number: "+14255550123"
///   voice_name: "en-US-NancyNeural"
///   callback_uri_host: "https://agent.example.com"
///   end_silence_timeout: 0.5
///
/// conversation:
///   backend: "voice_live"
///   persona: "default"
///   max_recognize_retry: 2
///   hangup_on_goodbye: true
///
/// openai:
///   endpoint: "https://my-oai.openai.azure.com/"
///   api_key: "..."
///   deployment: "gpt-4o-mini"
///   api_version: "2024-08-01-preview"
///   realtime_deployment: "gpt-4o-realtime-preview"
///
/// voice_live:
///   endpoint: "https://my-ai.cognitiveservices.azure.com/"
///   api_key: "..."
///   deployment: "gpt-4o-realtime-preview"
///   api_version: "2025-05-01-preview"
///   voice: "en-US-Emma2:DragonHDLatestNeural"
///
/// cache:
///   redis_url: "rediss://my-cache.redis.cache.windows.net:6380"
///   redis_password: "..."
///   ttl_seconds: 86400
///
/// cosmos:
///   url: "https://my-db.documents.azure.com:443/"
///   key: "..."
///   database: "callautomation"
///   container: "sessions"
///
/// auth:
///   api_secret: "trigger-secret"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub acs: Option<AcsYaml>,
    pub conversation: Option<ConversationYaml>,
    pub openai: Option<OpenAiYaml>,
    pub voice_live: Option<VoiceLiveYaml>,
    pub cache: Option<CacheYaml>,
    pub cosmos: Option<CosmosYaml>,
    pub auth: Option<AuthYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// ACS call automation settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AcsYaml {
    pub connection_string: Option<String>,
    pub cognitive_service_endpoint: Option<String>,
    pub agent_phone_number: Option<String>,
    pub target_phone_number: Option<String>,
    pub voice_name: Option<String>,
    pub callback_uri_host: Option<String>,
    pub end_silence_timeout: Option<f64>,
}

/// Conversation behaviour from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConversationYaml {
    pub backend: Option<String>,
    pub persona: Option<String>,
    pub max_recognize_retry: Option<u32>,
    pub hangup_on_goodbye: Option<bool>,
}

/// Azure OpenAI settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAiYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub realtime_deployment: Option<String>,
}

/// Azure Voice Live settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceLiveYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub voice: Option<String>,
}

/// Session cache configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub redis_url: Option<String>,
    pub redis_password: Option<String>,
    pub ttl_seconds: Option<u64>,
}

/// Cosmos DB session store configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CosmosYaml {
    pub url: Option<String>,
    pub key: Option<String>,
    pub database: Option<String>,
    pub container: Option<String>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub api_secret: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is malformed, or
    /// a field has an invalid type.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

acs:
  connection_string: "endpoint=https://acs.example.com/;accesskey=a2V5"
  callback_uri_host: "https://agent.example.com"
  end_silence_timeout: 0.8

conversation:
  backend: "pipeline"
  persona: "interview"
  max_recognize_retry: 3

openai:
  endpoint: "https://oai.example.com"
  api_key: "oai-key"

cache:
  redis_url: "redis://localhost:6379"
  ttl_seconds: 600

cosmos:
  url: "https://db.example.com:443/"
  key: "a2V5"
  container: "calls"

auth:
  api_secret: "trigger"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));

        let acs = config.acs.as_ref().unwrap();
        assert_eq!(acs.end_silence_timeout, Some(0.8));
        assert!(acs.agent_phone_number.is_none());

        let conversation = config.conversation.as_ref().unwrap();
        assert_eq!(conversation.backend.as_deref(), Some("pipeline"));
        assert_eq!(conversation.max_recognize_retry, Some(3));

        assert_eq!(config.cache.as_ref().unwrap().ttl_seconds, Some(600));
        assert_eq!(
            config.cosmos.as_ref().unwrap().container.as_deref(),
            Some("calls")
        );
        assert_eq!(
            config.auth.as_ref().unwrap().api_secret.as_deref(),
            Some("trigger")
        );
        assert!(config.voice_live.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.acs.is_none());
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
