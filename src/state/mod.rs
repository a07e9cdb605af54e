use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::CoreState;
use crate::core::cache::store::CacheStore;
use crate::core::events::CallEventDispatcher;

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Core layer state: cache, ACS client, transcript store and AI backends
    pub core_state: Arc<CoreState>,
    /// Routes EventGrid and callback events to call handlers
    pub dispatcher: Arc<CallEventDispatcher>,
}

impl AppState {
    pub async fn new(
        config: ServerConfig,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let core_state = CoreState::new(&config).await?;
        Ok(Self::with_core(config, core_state))
    }

    /// Build state around an existing core, used by tests to inject doubles.
    pub fn with_core(config: ServerConfig, core_state: Arc<CoreState>) -> Arc<Self> {
        let config = Arc::new(config);
        let dispatcher = Arc::new(CallEventDispatcher::new(
            config.clone(),
            core_state.clone(),
        ));
        Arc::new(Self {
            config,
            core_state,
            dispatcher,
        })
    }

    /// Get a handle to the application's cache store
    pub fn cache(&self) -> Arc<CacheStore> {
        self.core_state.cache.clone()
    }
}
