use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AiBackend, ServerConfig};
use crate::core::acs::{AcsCallAutomationClient, CallAutomation, UnconfiguredCallAutomation};
use crate::core::agent::{
    AgentPersona, ChatConfig, ChatService, RealtimeBackend, RealtimeConfig,
    RealtimeSessionManager,
};
use crate::core::cache::store::{CacheConfig, CacheStore};
use crate::core::session_store::{
    CosmosConfig, CosmosSessionStore, MemorySessionStore, SessionStore,
};
use crate::utils::req_manager::ReqManager;

const MEMORY_CACHE_MAX_ENTRIES: u64 = 100_000;
const MAX_CONCURRENT_REQUESTS: usize = 32;

type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Core-specific shared state for the application.
///
/// Owns the outbound clients every call shares: the session cache, ACS Call
/// Automation, the transcript store and the AI backends.
#[derive(Clone)]
pub struct CoreState {
    /// Per-call conversation state (Redis or in-memory)
    pub cache: Arc<CacheStore>,
    pub calls: Arc<dyn CallAutomation>,
    /// Durable transcripts (Cosmos DB or in-memory)
    pub sessions: Arc<dyn SessionStore>,
    pub chat: Arc<ChatService>,
    /// Present only for the realtime backends
    pub realtime: Option<Arc<dyn RealtimeBackend>>,
    /// Pooled HTTP client shared by every REST integration
    pub req_manager: Arc<ReqManager>,
}

impl CoreState {
    /// Build every client from configuration.
    ///
    /// Missing or unreachable optional services degrade to in-process
    /// stand-ins with a warning so the HTTP surface always starts.
    pub async fn new(config: &ServerConfig) -> Result<Arc<Self>, InitError> {
        let req_manager = Arc::new(ReqManager::new(MAX_CONCURRENT_REQUESTS)?);
        info!(
            max_concurrent = MAX_CONCURRENT_REQUESTS,
            "Initialized shared ReqManager"
        );

        let cache = Arc::new(Self::initialize_cache(config).await?);
        let calls = Self::initialize_call_automation(config, req_manager.clone());
        let sessions = Self::initialize_session_store(config, req_manager.clone()).await;

        let persona = config
            .agent_persona
            .parse::<AgentPersona>()
            .unwrap_or_default();
        let chat_config = match config.ai_backend {
            AiBackend::Pipeline => config
                .azure_openai_endpoint
                .clone()
                .zip(config.azure_openai_key.clone())
                .map(|(endpoint, api_key)| ChatConfig {
                    endpoint,
                    api_key,
                    deployment: config.azure_openai_deployment.clone(),
                    api_version: config.azure_openai_api_version.clone(),
                }),
            _ => None,
        };
        let chat = Arc::new(ChatService::new(
            chat_config,
            persona,
            cache.clone(),
            req_manager.clone(),
        ));

        let realtime = RealtimeConfig::from_server_config(config).map(|rt| {
            info!(provider = ?rt.provider, deployment = %rt.deployment, "Realtime backend enabled");
            Arc::new(RealtimeSessionManager::new(rt, sessions.clone(), calls.clone()))
                as Arc<dyn RealtimeBackend>
        });
        if realtime.is_none() && config.ai_backend.uses_media_streaming() {
            warn!(backend = %config.ai_backend, "Realtime backend selected but not configured");
        }

        Ok(Arc::new(Self {
            cache,
            calls,
            sessions,
            chat,
            realtime,
            req_manager,
        }))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        cache: Arc<CacheStore>,
        calls: Arc<dyn CallAutomation>,
        sessions: Arc<dyn SessionStore>,
        chat: Arc<ChatService>,
        realtime: Option<Arc<dyn RealtimeBackend>>,
        req_manager: Arc<ReqManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            calls,
            sessions,
            chat,
            realtime,
            req_manager,
        })
    }

    async fn initialize_cache(config: &ServerConfig) -> Result<CacheStore, InitError> {
        let memory = CacheConfig::Memory {
            max_entries: MEMORY_CACHE_MAX_ENTRIES,
            ttl_seconds: config.cache_ttl_seconds,
        };

        let Some(url) = config.redis_url_with_password() else {
            info!("REDIS_URL not set, using in-memory session cache");
            return Ok(CacheStore::from_config(memory).await?);
        };

        match CacheStore::from_config(CacheConfig::Redis {
            url,
            ttl_seconds: config.cache_ttl_seconds,
        })
        .await
        {
            Ok(store) => {
                info!("Connected to Redis session cache");
                Ok(store)
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, falling back to in-memory session cache");
                Ok(CacheStore::from_config(memory).await?)
            }
        }
    }

    fn initialize_call_automation(
        config: &ServerConfig,
        req_manager: Arc<ReqManager>,
    ) -> Arc<dyn CallAutomation> {
        let Some(connection_string) = config.acs_connection_string.as_deref() else {
            warn!("ACS_CONNECTION_STRING not set, call automation is disabled");
            return Arc::new(UnconfiguredCallAutomation);
        };

        match AcsCallAutomationClient::from_connection_string(connection_string, req_manager) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(error = %e, "Invalid ACS connection string, call automation is disabled");
                Arc::new(UnconfiguredCallAutomation)
            }
        }
    }

    async fn initialize_session_store(
        config: &ServerConfig,
        req_manager: Arc<ReqManager>,
    ) -> Arc<dyn SessionStore> {
        let (Some(account_url), Some(master_key)) =
            (config.cosmos_db_url.clone(), config.cosmos_db_key.clone())
        else {
            info!("Cosmos DB not configured, keeping transcripts in memory");
            return Arc::new(MemorySessionStore::new());
        };

        let cosmos = CosmosConfig {
            account_url,
            master_key,
            database: config.cosmos_db_database.clone(),
            container: config.cosmos_db_container.clone(),
        };
        match CosmosSessionStore::connect(cosmos, req_manager).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(error = %e, "Cosmos DB unavailable, keeping transcripts in memory");
                Arc::new(MemorySessionStore::new())
            }
        }
    }
}
