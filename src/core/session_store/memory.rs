use async_trait::async_trait;
use chrono::Utc;
use moka::future::{Cache as MokaCache, CacheBuilder as MokaCacheBuilder};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::{CallSession, SessionStore, SessionStoreError, SessionStoreResult};

/// Transcripts untouched for this long are evicted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_MAX_SESSIONS: u64 = 10_000;

/// Process-local transcript store, used when Cosmos DB is not configured.
///
/// Entries expire once idle for the retention window, so finished calls do
/// not accumulate for the life of the process.
pub struct MemorySessionStore {
    sessions: MokaCache<String, Arc<Mutex<CallSession>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            sessions: MokaCacheBuilder::new(DEFAULT_MAX_SESSIONS)
                .time_to_idle(retention)
                .build(),
        }
    }

    /// Number of live transcripts, after pending evictions are applied.
    pub async fn len(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn session(
        &self,
        call_connection_id: &str,
    ) -> SessionStoreResult<Arc<Mutex<CallSession>>> {
        self.sessions
            .get(call_connection_id)
            .await
            .ok_or_else(|| SessionStoreError::SessionNotFound(call_connection_id.to_string()))
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        call_connection_id: &str,
        caller_id: &str,
    ) -> SessionStoreResult<CallSession> {
        let entry = self
            .sessions
            .entry(call_connection_id.to_string())
            .or_insert_with(async {
                Arc::new(Mutex::new(CallSession::new(call_connection_id, caller_id)))
            })
            .await;
        let session = entry.value().lock().clone();
        Ok(session)
    }

    async fn append_message(
        &self,
        call_connection_id: &str,
        sender: &str,
        message: &str,
    ) -> SessionStoreResult<()> {
        let session = self.session(call_connection_id).await?;
        session.lock().push(sender, message);
        Ok(())
    }

    async fn close_session(&self, call_connection_id: &str) -> SessionStoreResult<()> {
        let session = self.session(call_connection_id).await?;
        session.lock().call_end_time = Some(Utc::now());
        Ok(())
    }

    async fn get_session(&self, call_connection_id: &str) -> SessionStoreResult<CallSession> {
        let session = self.session(call_connection_id).await?;
        let snapshot = session.lock().clone();
        Ok(snapshot)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = MemorySessionStore::new();
        store.create_session("conn-1", "4:+1555").await.unwrap();
        store.append_message("conn-1", "user", "hi").await.unwrap();
        store
            .append_message("conn-1", "assistant", "hello there")
            .await
            .unwrap();
        store.close_session("conn-1").await.unwrap();

        let session = store.get_session("conn-1").await.unwrap();
        assert_eq!(session.caller_id, "4:+1555");
        assert_eq!(session.conversation.len(), 2);
        assert_eq!(session.conversation[1].sender, "assistant");
        assert!(session.call_end_time.is_some());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let store = MemorySessionStore::new();
        store.create_session("conn-1", "a").await.unwrap();
        store.append_message("conn-1", "user", "x").await.unwrap();
        let again = store.create_session("conn-1", "b").await.unwrap();
        assert_eq!(again.caller_id, "a");
        assert_eq!(again.conversation.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let store = MemorySessionStore::new();
        let err = store.append_message("nope", "user", "x").await.unwrap_err();
        assert!(matches!(err, SessionStoreError::SessionNotFound(id) if id == "nope"));
        assert!(store.close_session("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let store = MemorySessionStore::with_retention(Duration::from_millis(100));
        store.create_session("conn-old", "a").await.unwrap();
        store.close_session("conn-old").await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(matches!(
            store.get_session("conn-old").await,
            Err(SessionStoreError::SessionNotFound(_))
        ));
        assert!(store.is_empty().await);

        store.create_session("conn-new", "b").await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
