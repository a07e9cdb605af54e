pub mod acs;
pub mod agent;
pub mod cache;
pub mod call_handler;
pub mod events;
pub mod session_store;
pub mod state;

// Re-export commonly used types for convenience
pub use acs::{AcsCallAutomationClient, AcsError, CallAutomation, UnconfiguredCallAutomation};
pub use agent::{ChatService, RealtimeBackend, RealtimeSessionManager};
pub use cache::{CacheConfig, CacheStore};
pub use call_handler::CallHandler;
pub use events::{CallEventDispatcher, DispatchError};
pub use session_store::{CallSession, SessionStore, SessionStoreError};

// Re-export CoreState for external use
pub use state::CoreState;
