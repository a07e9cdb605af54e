use super::utils::{env_var, parse_bool, parse_env};
use super::yaml::YamlConfig;
use super::{
    AiBackend, DEFAULT_CACHE_TTL_SECONDS, DEFAULT_COSMOS_CONTAINER, DEFAULT_COSMOS_DATABASE,
    DEFAULT_END_SILENCE_TIMEOUT, DEFAULT_HOST, DEFAULT_MAX_RECOGNIZE_RETRY,
    DEFAULT_OPENAI_API_VERSION, DEFAULT_OPENAI_DEPLOYMENT, DEFAULT_PERSONA, DEFAULT_PORT,
    DEFAULT_REALTIME_DEPLOYMENT, DEFAULT_VOICE_LIVE_API_VERSION, DEFAULT_VOICE_LIVE_VOICE,
    DEFAULT_VOICE_NAME, ServerConfig,
};

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration providing base values
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: ENV > YAML > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env_var($env_var)
                .or($yaml_value)
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: ENV > YAML
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            env_var($env_var).or($yaml_value)
        };
    }

    // Helper macro for parsed values: ENV > YAML > Default
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            parse_env($env_var)?.or($yaml_value).unwrap_or($default)
        };
    }

    let server = yaml.server.unwrap_or_default();
    let acs = yaml.acs.unwrap_or_default();
    let conversation = yaml.conversation.unwrap_or_default();
    let openai = yaml.openai.unwrap_or_default();
    let voice_live = yaml.voice_live.unwrap_or_default();
    let cache = yaml.cache.unwrap_or_default();
    let cosmos = yaml.cosmos.unwrap_or_default();
    let auth = yaml.auth.unwrap_or_default();

    // Server configuration
    let host = get_value!("HOST", server.host, DEFAULT_HOST);
    let port = get_parsed!("PORT", server.port, DEFAULT_PORT);

    // ACS call automation
    let acs_connection_string = get_optional!("ACS_CONNECTION_STRING", acs.connection_string);
    let cognitive_service_endpoint = get_optional!(
        "COGNITIVE_SERVICE_ENDPOINT",
        acs.cognitive_service_endpoint
    );
    let agent_phone_number = get_optional!("AGENT_PHONE_NUMBER", acs.agent_phone_number);
    let target_phone_number = get_optional!("TARGET_PHONE_NUMBER", acs.target_phone_number);
    let voice_name = get_value!("VOICE_NAME", acs.voice_name, DEFAULT_VOICE_NAME);
    let callback_uri_host = get_optional!("CALLBACK_URI_HOST", acs.callback_uri_host);
    let end_silence_timeout = get_parsed!(
        "END_SILENCE_TIMEOUT",
        acs.end_silence_timeout,
        DEFAULT_END_SILENCE_TIMEOUT
    );

    // Conversation
    let ai_backend = match get_optional!("AI_BACKEND", conversation.backend) {
        Some(raw) => raw.parse::<AiBackend>()?,
        None => AiBackend::default(),
    };
    let agent_persona = get_value!("AGENT_PERSONA", conversation.persona, DEFAULT_PERSONA);
    let max_recognize_retry = get_parsed!(
        "MAX_RECOGNIZE_RETRY",
        conversation.max_recognize_retry,
        DEFAULT_MAX_RECOGNIZE_RETRY
    );
    let hangup_on_goodbye = match env_var("HANGUP_ON_GOODBYE") {
        Some(raw) => parse_bool(&raw)
            .ok_or_else(|| format!("Invalid HANGUP_ON_GOODBYE environment variable: {raw}"))?,
        None => conversation.hangup_on_goodbye.unwrap_or(true),
    };

    // Azure OpenAI
    let azure_openai_endpoint = get_optional!("AZURE_OPENAI_SERVICE_ENDPOINT", openai.endpoint);
    let azure_openai_key = get_optional!("AZURE_OPENAI_SERVICE_KEY", openai.api_key);
    let azure_openai_deployment = get_value!(
        "AZURE_OPENAI_DEPLOYMENT_MODEL_NAME",
        openai.deployment,
        DEFAULT_OPENAI_DEPLOYMENT
    );
    let azure_openai_api_version = get_value!(
        "AZURE_OPENAI_API_VERSION",
        openai.api_version,
        DEFAULT_OPENAI_API_VERSION
    );
    let azure_openai_realtime_deployment = get_value!(
        "AZURE_OPENAI_REALTIME_DEPLOYMENT",
        openai.realtime_deployment,
        DEFAULT_REALTIME_DEPLOYMENT
    );

    // Azure Voice Live
    let voice_live_endpoint = get_optional!("AZURE_VOICE_LIVE_ENDPOINT", voice_live.endpoint);
    let voice_live_api_key = get_optional!("AZURE_VOICE_LIVE_API_KEY", voice_live.api_key);
    let voice_live_deployment = get_value!(
        "AZURE_VOICE_LIVE_DEPLOYMENT",
        voice_live.deployment,
        DEFAULT_REALTIME_DEPLOYMENT
    );
    let voice_live_api_version = get_value!(
        "AZURE_VOICE_LIVE_API_VERSION",
        voice_live.api_version,
        DEFAULT_VOICE_LIVE_API_VERSION
    );
    let voice_live_voice = get_value!(
        "AZURE_VOICE_LIVE_VOICE",
        voice_live.voice,
        DEFAULT_VOICE_LIVE_VOICE
    );

    // Session cache
    let redis_url = get_optional!("REDIS_URL", cache.redis_url);
    let redis_password = get_optional!("REDIS_PASSWORD", cache.redis_password);
    let cache_ttl_seconds = Some(get_parsed!(
        "CACHE_TTL_SECONDS",
        cache.ttl_seconds,
        DEFAULT_CACHE_TTL_SECONDS
    ));

    // Session store
    let cosmos_db_url = get_optional!("COSMOS_DB_URL", cosmos.url);
    let cosmos_db_key = get_optional!("COSMOS_DB_KEY", cosmos.key);
    let cosmos_db_database = get_value!(
        "COSMOS_DB_DATABASE_NAME",
        cosmos.database,
        DEFAULT_COSMOS_DATABASE
    );
    let cosmos_db_container = get_value!(
        "COSMOS_DB_CONTAINER_NAME",
        cosmos.container,
        DEFAULT_COSMOS_CONTAINER
    );

    // Authentication
    let auth_api_secret = get_optional!("AUTH_API_SECRET", auth.api_secret);

    Ok(ServerConfig {
        host,
        port,
        acs_connection_string,
        cognitive_service_endpoint,
        agent_phone_number,
        target_phone_number,
        voice_name,
        callback_uri_host,
        end_silence_timeout,
        ai_backend,
        agent_persona,
        max_recognize_retry,
        hangup_on_goodbye,
        azure_openai_endpoint,
        azure_openai_key,
        azure_openai_deployment,
        azure_openai_api_version,
        azure_openai_realtime_deployment,
        voice_live_endpoint,
        voice_live_api_key,
        voice_live_deployment,
        voice_live_api_version,
        voice_live_voice,
        redis_url,
        redis_password,
        cache_ttl_seconds,
        cosmos_db_url,
        cosmos_db_key,
        cosmos_db_database,
        cosmos_db_container,
        auth_api_secret,
    })
}
