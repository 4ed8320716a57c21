//! The session orchestrator.
//!
//! Independent of the server kernel; embeddable in the kernel's request
//! pipeline or a separate host. Tracks per-session state, detects intent on
//! every message, and switches sessions between registered workflows.

pub mod context;
pub mod intent;
pub mod registry;
pub mod session;
pub mod store;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::errors::OrchestratorError;
use context::{Checkpoint, ContextLoader, ContextManager};
use intent::{IntentAnalysis, IntentDetector, RuleBasedDetector};
use registry::{WorkflowDefinition, WorkflowRegistry};
use session::{ConversationEntry, SessionManager, UserSession};
use store::SessionStore;

/// Outcome of processing one user message.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub session: UserSession,
    pub intent: IntentAnalysis,
    pub workflow_changed: bool,
}

/// Summary counters for one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub user_id: String,
    pub message_count: usize,
    pub active_workflow: Option<String>,
    pub current_context: String,
    pub recent_workflows: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-component liveness report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub session_store: String,
    pub workflow_registry: String,
    pub intent_detector: String,
    pub active_sessions: Option<usize>,
    pub registered_workflows: usize,
    pub uptime_seconds: u64,
}

/// Facade over the session manager, workflow registry, context manager, and
/// intent detector.
pub struct Orchestrator {
    sessions: SessionManager,
    registry: Arc<WorkflowRegistry>,
    contexts: ContextManager,
    detector: Arc<dyn IntentDetector>,
    started_at: Instant,
}

impl Orchestrator {
    /// Builds an orchestrator over `store` with the rule-based detector.
    pub fn new(store: Arc<dyn SessionStore>, session_timeout: Duration) -> Self {
        let registry = Arc::new(WorkflowRegistry::new());
        Self {
            sessions: SessionManager::new(store, session_timeout),
            contexts: ContextManager::new(Arc::clone(&registry)),
            detector: Arc::new(RuleBasedDetector::new(Arc::clone(&registry))),
            registry,
            started_at: Instant::now(),
        }
    }

    /// Replaces the intent detector.
    pub fn with_detector(mut self, detector: Arc<dyn IntentDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Registers a workflow definition.
    pub fn register_workflow(&self, def: WorkflowDefinition) {
        self.registry.register(def);
    }

    /// Registers a context loader for one workflow id.
    pub fn register_context_loader(
        &self,
        workflow_id: impl Into<String>,
        loader: Arc<dyn ContextLoader>,
    ) {
        self.contexts.register_loader(workflow_id, loader);
    }

    /// Routes one user message through the orchestrator:
    /// resolve/create the session, append the message to history, analyze
    /// intent, switch workflow context when the analysis asks for it, and
    /// persist the session.
    pub async fn process_message(
        &self,
        message: &str,
        session_id: Option<&str>,
        user_id: &str,
        user_name: &str,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let mut session = self
            .sessions
            .get_or_create_session(session_id, user_id, user_name)
            .await?;

        session
            .conversation_history
            .push(ConversationEntry::user(message, session.active_workflow.clone()));

        let intent = self.detector.analyze_message(message, &session).await;

        let mut workflow_changed = false;
        if intent.should_switch_workflow {
            self.contexts
                .switch_context(
                    &mut session,
                    intent.target_workflow.as_deref(),
                    intent.extracted_data.clone(),
                )
                .await?;
            workflow_changed = true;
        }

        self.sessions.update_session(&mut session).await?;

        Ok(ProcessOutcome {
            session,
            intent,
            workflow_changed,
        })
    }

    /// Switches a session onto `target` (or back to general for `None`) and
    /// persists it.
    pub async fn switch_workflow(
        &self,
        session_id: &str,
        target: Option<&str>,
        init_data: Option<Value>,
    ) -> Result<UserSession, OrchestratorError> {
        let mut session = self.require_session(session_id).await?;
        self.contexts
            .switch_context(&mut session, target, init_data)
            .await?;
        self.sessions.update_session(&mut session).await?;
        Ok(session)
    }

    /// Updates workflow progress on a session and persists it.
    pub async fn update_workflow_progress(
        &self,
        session_id: &str,
        step: &str,
        percentage: f64,
    ) -> Result<UserSession, OrchestratorError> {
        let mut session = self.require_session(session_id).await?;
        self.contexts
            .update_workflow_progress(&mut session, step, percentage)?;
        self.sessions.update_session(&mut session).await?;
        Ok(session)
    }

    /// Adds a checkpoint to a session's active workflow and persists it.
    pub async fn add_workflow_checkpoint(
        &self,
        session_id: &str,
        description: Option<String>,
        data: Option<Value>,
    ) -> Result<Checkpoint, OrchestratorError> {
        let mut session = self.require_session(session_id).await?;
        let checkpoint = self
            .contexts
            .add_workflow_checkpoint(&mut session, description, data)?;
        self.sessions.update_session(&mut session).await?;
        Ok(checkpoint)
    }

    /// Summary counters for one session.
    pub async fn get_session_stats(
        &self,
        session_id: &str,
    ) -> Result<SessionStats, OrchestratorError> {
        let session = self.require_session(session_id).await?;
        Ok(SessionStats {
            session_id: session.session_id,
            user_id: session.user_id,
            message_count: session.conversation_history.len(),
            active_workflow: session.active_workflow,
            current_context: session.current_context,
            recent_workflows: session.global_context.recent_workflows,
            created_at: session.created_at,
            updated_at: session.updated_at,
        })
    }

    /// Expires idle sessions through the store's cleanup hook.
    pub async fn cleanup_expired_sessions(&self) -> Result<usize, OrchestratorError> {
        Ok(self.sessions.cleanup().await?)
    }

    /// Reports per-component liveness plus headline counters.
    pub async fn health_check(&self) -> HealthReport {
        let (store_status, active_sessions) = match self.sessions.store().count().await {
            Ok(count) => ("ok".to_string(), count),
            Err(e) => (format!("error: {}", e), None),
        };
        HealthReport {
            status: if store_status == "ok" {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            session_store: store_status,
            workflow_registry: "ok".to_string(),
            intent_detector: "ok".to_string(),
            active_sessions,
            registered_workflows: self.registry.len(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    async fn require_session(&self, session_id: &str) -> Result<UserSession, OrchestratorError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }
}
