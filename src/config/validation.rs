use super::{AiBackend, ServerConfig};
use crate::core::agent::AgentPersona;

/// Run every configuration check in order, returning the first failure.
pub fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_backend_credentials(config)?;
    validate_callback_uri_host(&config.callback_uri_host)?;
    validate_end_silence_timeout(config.end_silence_timeout)?;
    validate_agent_persona(&config.agent_persona)?;
    Ok(())
}

/// Validate that the selected AI backend has its endpoint and key
///
/// Realtime backends open a WebSocket with an `api-key` header, and the
/// pipeline backend posts chat completions with one, so a missing value
/// would only surface once a call is already connected.
pub fn validate_backend_credentials(
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let (endpoint, key, endpoint_var, key_var) = match config.ai_backend {
        AiBackend::VoiceLive => (
            &config.voice_live_endpoint,
            &config.voice_live_api_key,
            "AZURE_VOICE_LIVE_ENDPOINT",
            "AZURE_VOICE_LIVE_API_KEY",
        ),
        AiBackend::OpenAiRealtime | AiBackend::Pipeline => (
            &config.azure_openai_endpoint,
            &config.azure_openai_key,
            "AZURE_OPENAI_SERVICE_ENDPOINT",
            "AZURE_OPENAI_SERVICE_KEY",
        ),
    };

    if endpoint.is_none() {
        return Err(format!(
            "{endpoint_var} is required when AI_BACKEND={}",
            config.ai_backend
        )
        .into());
    }
    if key.is_none() {
        return Err(format!("{key_var} is required when AI_BACKEND={}", config.ai_backend).into());
    }

    Ok(())
}

/// Validate that the public callback host is an absolute http(s) URL
pub fn validate_callback_uri_host(host: &Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(host) = host else {
        return Ok(());
    };

    let parsed = url::Url::parse(host)
        .map_err(|e| format!("CALLBACK_URI_HOST must be an absolute URL ({host}): {e}"))?;

    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(format!("CALLBACK_URI_HOST must use http or https, got: {host}").into());
    }

    Ok(())
}

/// Validate the recognition end-of-silence timeout (seconds)
pub fn validate_end_silence_timeout(timeout: f64) -> Result<(), Box<dyn std::error::Error>> {
    if !timeout.is_finite() || timeout <= 0.0 {
        return Err(format!("END_SILENCE_TIMEOUT must be a positive number, got: {timeout}").into());
    }
    Ok(())
}

/// Validate that `AGENT_PERSONA` names a known persona
pub fn validate_agent_persona(persona: &str) -> Result<(), Box<dyn std::error::Error>> {
    persona.parse::<AgentPersona>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_credentials_pipeline() {
        let mut config = ServerConfig {
            ai_backend: AiBackend::Pipeline,
            ..Default::default()
        };
        let err = validate_backend_credentials(&config).unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_SERVICE_ENDPOINT"));

        config.azure_openai_endpoint = Some("https://oai.example.com".to_string());
        let err = validate_backend_credentials(&config).unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_SERVICE_KEY"));

        config.azure_openai_key = Some("key".to_string());
        assert!(validate_backend_credentials(&config).is_ok());
    }

    #[test]
    fn test_backend_credentials_voice_live() {
        let config = ServerConfig {
            ai_backend: AiBackend::VoiceLive,
            voice_live_endpoint: Some("https://vl.example.com".to_string()),
            voice_live_api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert!(validate_backend_credentials(&config).is_ok());
    }

    #[test]
    fn test_callback_uri_host() {
        assert!(validate_callback_uri_host(&None).is_ok());
        assert!(validate_callback_uri_host(&Some("https://a.example.com".to_string())).is_ok());
        assert!(validate_callback_uri_host(&Some("http://localhost:8000".to_string())).is_ok());
        assert!(validate_callback_uri_host(&Some("a.example.com".to_string())).is_err());
        assert!(validate_callback_uri_host(&Some("ftp://a.example.com".to_string())).is_err());
    }

    #[test]
    fn test_end_silence_timeout() {
        assert!(validate_end_silence_timeout(0.5).is_ok());
        assert!(validate_end_silence_timeout(0.0).is_err());
        assert!(validate_end_silence_timeout(-1.0).is_err());
        assert!(validate_end_silence_timeout(f64::NAN).is_err());
    }

    #[test]
    fn test_agent_persona() {
        assert!(validate_agent_persona("interview").is_ok());
        assert!(validate_agent_persona("Closure").is_ok());
        let err = validate_agent_persona("pirate").unwrap_err();
        assert!(err.to_string().contains("pirate"));
    }
}
