//! Pluggable session storage.
//!
//! The orchestrator owns sessions only transiently during a call; the store
//! is the system of record. The in-memory store here is the default backend;
//! remote key/value backends implement the same trait and typically rely on
//! per-entry TTL instead of `cleanup` (leaving it the default no-op).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::StoreError;
use crate::orchestrator::session::UserSession;

/// Storage contract for user sessions.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError>;

    async fn set(&self, session: &UserSession) -> Result<(), StoreError>;

    /// Removes a session, returning whether it existed.
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;

    async fn exists(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Removes sessions idle since `older_than`, returning the count
    /// removed. Backends with native expiry leave this a no-op.
    async fn cleanup(&self, _older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Number of live sessions, when the backend can enumerate them.
    async fn count(&self) -> Result<Option<usize>, StoreError> {
        Ok(None)
    }
}

/// In-memory session store backed by a map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, UserSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<UserSession>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn set(&self, session: &UserSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn exists(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.read().await.contains_key(session_id))
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.updated_at >= older_than);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!("Cleaned up {} expired sessions", removed);
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<Option<usize>, StoreError> {
        Ok(Some(self.sessions.read().await.len()))
    }
}
