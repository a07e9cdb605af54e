use super::ServerConfig;
use super::merge::merge_config;
use super::validation::validate_config;

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible defaults.
    /// Also loads from .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A numeric or enum environment variable is malformed
    /// - The selected AI backend is missing its endpoint or key
    /// - `CALLBACK_URI_HOST` is not an http(s) URL
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        validate_config(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiBackend;
    use serial_test::serial;
    use std::env;

    // Helper to clean up environment variables after tests
    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("AI_BACKEND");
            env::remove_var("AZURE_VOICE_LIVE_ENDPOINT");
            env::remove_var("AZURE_VOICE_LIVE_API_KEY");
            env::remove_var("AZURE_OPENAI_SERVICE_ENDPOINT");
            env::remove_var("AZURE_OPENAI_SERVICE_KEY");
            env::remove_var("CALLBACK_URI_HOST");
            env::remove_var("END_SILENCE_TIMEOUT");
            env::remove_var("HOST");
            env::remove_var("PORT");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_voice_live() {
        cleanup_env_vars();
        unsafe {
            env::set_var("AZURE_VOICE_LIVE_ENDPOINT", "https://vl.example.com/");
            env::set_var("AZURE_VOICE_LIVE_API_KEY", "vl-key");
            env::set_var("CALLBACK_URI_HOST", "https://agent.example.com");
        }

        let config = ServerConfig::from_env().expect("Should load config");
        assert_eq!(config.ai_backend, AiBackend::VoiceLive);
        assert_eq!(config.voice_live_api_version, "2025-05-01-preview");
        assert_eq!(config.voice_live_deployment, "gpt-4o-realtime-preview");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_voice_live_requires_key() {
        cleanup_env_vars();
        unsafe {
            env::set_var("AZURE_VOICE_LIVE_ENDPOINT", "https://vl.example.com/");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("AZURE_VOICE_LIVE_API_KEY")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_callback_host() {
        cleanup_env_vars();
        unsafe {
            env::set_var("AI_BACKEND", "pipeline");
            env::set_var("AZURE_OPENAI_SERVICE_ENDPOINT", "https://oai.example.com");
            env::set_var("AZURE_OPENAI_SERVICE_KEY", "oai-key");
            env::set_var("CALLBACK_URI_HOST", "agent.example.com");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("CALLBACK_URI_HOST"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_non_positive_silence_timeout() {
        cleanup_env_vars();
        unsafe {
            env::set_var("AI_BACKEND", "pipeline");
            env::set_var("AZURE_OPENAI_SERVICE_ENDPOINT", "https://oai.example.com");
            env::set_var("AZURE_OPENAI_SERVICE_KEY", "oai-key");
            env::set_var("END_SILENCE_TIMEOUT", "0");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("END_SILENCE_TIMEOUT")
        );

        cleanup_env_vars();
    }
}
