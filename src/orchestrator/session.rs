//! Session model and the session manager.
//!
//! A session is per-user conversational state: the active workflow, the
//! cross-workflow global context, and the append-only conversation history.
//! The manager drives lifecycle on top of a pluggable [`SessionStore`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{OrchestratorError, StoreError};
use crate::orchestrator::context::WorkflowContext;
use crate::orchestrator::store::SessionStore;

/// Most-recent-first workflow cap in the global context.
const RECENT_WORKFLOWS_CAP: usize = 10;

/// One entry of a session's conversation history. Entries are append-only
/// and strictly ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>, workflow: Option<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            workflow,
        }
    }
}

/// Cross-workflow state carried by a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalContext {
    /// Deduplicated MRU list of visited workflows, most recent first,
    /// capped at ten entries.
    #[serde(default)]
    pub recent_workflows: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

/// Per-user conversational state.
///
/// An `active_workflow` implies `workflow_context` is present and
/// `current_context` names the same workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_workflow: Option<String>,
    /// `"general"` or the active workflow id.
    pub current_context: String,
    #[serde(default)]
    pub global_context: GlobalContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_context: Option<WorkflowContext>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl UserSession {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            active_workflow: None,
            current_context: "general".to_string(),
            global_context: GlobalContext::default(),
            workflow_context: None,
            conversation_history: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }

    /// Moves `workflow_id` to the front of the MRU list, deduplicating and
    /// keeping at most ten entries.
    pub fn touch_recent_workflow(&mut self, workflow_id: &str) {
        let recents = &mut self.global_context.recent_workflows;
        recents.retain(|w| w != workflow_id);
        recents.insert(0, workflow_id.to_string());
        recents.truncate(RECENT_WORKFLOWS_CAP);
    }
}

/// Owns session lifecycle on top of a [`SessionStore`].
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    session_timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, session_timeout: Duration) -> Self {
        Self {
            store,
            session_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn generate_session_id() -> String {
        let suffix = Alphanumeric.sample_string(&mut rand::rng(), 9);
        format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
    }

    /// Allocates a session, defaulting the id to
    /// `"session_{epoch_millis}_{9-char random}"`.
    pub async fn create_session(
        &self,
        user_id: &str,
        user_name: &str,
        session_id: Option<String>,
    ) -> Result<UserSession, StoreError> {
        let session = UserSession::new(
            session_id.unwrap_or_else(Self::generate_session_id),
            user_id,
            user_name,
        );
        self.store.set(&session).await?;
        tracing::debug!("Created session {}", session.session_id);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<UserSession>, StoreError> {
        self.store.get(session_id).await
    }

    /// Loads the session when present, otherwise creates one (honoring the
    /// caller's id when provided).
    pub async fn get_or_create_session(
        &self,
        session_id: Option<&str>,
        user_id: &str,
        user_name: &str,
    ) -> Result<UserSession, StoreError> {
        if let Some(id) = session_id
            && let Some(session) = self.store.get(id).await?
        {
            return Ok(session);
        }
        self.create_session(user_id, user_name, session_id.map(|s| s.to_string()))
            .await
    }

    /// Stamps `updated_at` and writes the session through to the store.
    pub async fn update_session(&self, session: &mut UserSession) -> Result<(), StoreError> {
        session.updated_at = Utc::now();
        self.store.set(session).await
    }

    /// Removes a session, returning whether it existed.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, StoreError> {
        self.store.delete(session_id).await
    }

    /// Appends an entry to the conversation history and writes through.
    pub async fn add_message(
        &self,
        session_id: &str,
        entry: ConversationEntry,
    ) -> Result<UserSession, OrchestratorError> {
        let mut session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        session.conversation_history.push(entry);
        self.update_session(&mut session).await?;
        Ok(session)
    }

    /// Expires sessions idle longer than the configured timeout.
    pub async fn cleanup(&self) -> Result<usize, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.session_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));
        self.store.cleanup(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::store::InMemorySessionStore;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(InMemorySessionStore::new()),
            Duration::from_secs(30 * 60),
        )
    }

    #[tokio::test]
    async fn generated_ids_carry_the_session_prefix() {
        let m = manager();
        let session = m.create_session("u-1", "User", None).await.unwrap();
        assert!(session.session_id.starts_with("session_"));
        let suffix = session.session_id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 9);
    }

    #[tokio::test]
    async fn get_or_create_honors_caller_id() {
        let m = manager();
        let session = m
            .get_or_create_session(Some("my-session"), "u-1", "User")
            .await
            .unwrap();
        assert_eq!(session.session_id, "my-session");

        // Second call loads rather than recreates.
        let again = m
            .get_or_create_session(Some("my-session"), "u-2", "Other")
            .await
            .unwrap();
        assert_eq!(again.user_id, "u-1");
    }

    #[tokio::test]
    async fn updated_at_never_precedes_created_at() {
        let m = manager();
        let mut session = m.create_session("u-1", "User", None).await.unwrap();
        m.update_session(&mut session).await.unwrap();
        assert!(session.created_at <= session.updated_at);
    }

    #[tokio::test]
    async fn add_message_writes_through() {
        let m = manager();
        let session = m.create_session("u-1", "User", None).await.unwrap();
        let updated = m
            .add_message(
                &session.session_id,
                ConversationEntry::user("hello", None),
            )
            .await
            .unwrap();
        assert_eq!(updated.conversation_history.len(), 1);

        let reloaded = m.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(reloaded.conversation_history[0].content, "hello");

        let err = m
            .add_message("missing", ConversationEntry::user("hi", None))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::SessionNotFound(_)));
    }

    #[test]
    fn recent_workflows_dedup_and_cap() {
        let mut session = UserSession::new("s", "u", "U");
        for i in 0..12 {
            session.touch_recent_workflow(&format!("wf-{}", i));
        }
        session.touch_recent_workflow("wf-5");
        let recents = &session.global_context.recent_workflows;
        assert_eq!(recents.len(), 10);
        assert_eq!(recents[0], "wf-5");
        let mut deduped = recents.clone();
        deduped.dedup();
        assert_eq!(deduped.len(), recents.len());
    }
}
