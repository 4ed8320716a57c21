//! Workflow context, state, checkpoints, and the context manager.
//!
//! Checkpoints are tracked in two places, on the state and on the enclosing
//! context, matching the upstream platform; every append goes through
//! [`ContextManager::add_workflow_checkpoint`] so the two lists stay
//! synchronized.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::OrchestratorError;
use crate::orchestrator::registry::WorkflowRegistry;
use crate::orchestrator::session::UserSession;

/// A snapshot of workflow progress at a moment in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data: Value,
}

/// Bookkeeping metadata on a workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    pub started_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Always within `[0, 100]`.
    pub completion_percentage: f64,
    pub is_draft: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// The mutable state of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub workflow_id: String,
    pub current_step: String,
    pub data: Value,
    pub metadata: StateMetadata,
    pub checkpoints: Vec<Checkpoint>,
}

/// One action recorded against a workflow context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

/// Everything a session carries for its active workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub hydrated_data: Value,
    pub tools: Vec<String>,
    pub history: Vec<HistoryEntry>,
    /// Mirrors `state.checkpoints`; appends are synchronized.
    pub checkpoints: Vec<Checkpoint>,
}

impl WorkflowContext {
    /// A skeletal context for a workflow with no registered loader.
    pub fn skeletal(workflow_id: &str, tools: Vec<String>, init_data: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.to_string(),
            state: WorkflowState {
                workflow_id: workflow_id.to_string(),
                current_step: "initial".to_string(),
                data: init_data.unwrap_or_else(|| json!({})),
                metadata: StateMetadata {
                    started_at: now,
                    last_modified: now,
                    completion_percentage: 0.0,
                    is_draft: true,
                    tags: None,
                },
                checkpoints: Vec::new(),
            },
            hydrated_data: json!({}),
            tools,
            history: Vec::new(),
            checkpoints: Vec::new(),
        }
    }
}

/// Loads and hydrates rich workflow contexts from an external source.
/// Registered per workflow id; workflows without a loader get the skeletal
/// context.
#[async_trait::async_trait]
pub trait ContextLoader: Send + Sync {
    async fn load_context(
        &self,
        workflow_id: &str,
        session_id: &str,
        entities: Option<&Value>,
    ) -> anyhow::Result<WorkflowContext>;

    async fn hydrate_context(
        &self,
        context: WorkflowContext,
        entities: &Value,
    ) -> anyhow::Result<WorkflowContext>;
}

/// Builds and switches workflow contexts on sessions.
pub struct ContextManager {
    registry: Arc<WorkflowRegistry>,
    loaders: RwLock<HashMap<String, Arc<dyn ContextLoader>>>,
}

impl ContextManager {
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        Self {
            registry,
            loaders: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a context loader for one workflow id.
    pub fn register_loader(&self, workflow_id: impl Into<String>, loader: Arc<dyn ContextLoader>) {
        self.loaders
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(workflow_id.into(), loader);
    }

    fn loader_for(&self, workflow_id: &str) -> Option<Arc<dyn ContextLoader>> {
        self.loaders
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(workflow_id)
            .cloned()
    }

    /// Switches the session onto `target`, or back to the general context
    /// when `target` is `None`.
    ///
    /// Switching onto the already-active workflow only refreshes the MRU
    /// list; the existing context (and its checkpoints) is preserved, which
    /// makes the operation idempotent.
    ///
    /// # Errors
    /// `UnknownWorkflow` when `target` is not registered.
    pub async fn switch_context(
        &self,
        session: &mut UserSession,
        target: Option<&str>,
        init_data: Option<Value>,
    ) -> Result<(), OrchestratorError> {
        let Some(target) = target else {
            session.active_workflow = None;
            session.workflow_context = None;
            session.current_context = "general".to_string();
            tracing::debug!("Session {} back to general context", session.session_id);
            return Ok(());
        };

        let workflow = self
            .registry
            .get(target)
            .ok_or_else(|| OrchestratorError::UnknownWorkflow(target.to_string()))?;

        if session.active_workflow.as_deref() == Some(target) {
            session.touch_recent_workflow(target);
            return Ok(());
        }

        let context = match self.loader_for(target) {
            Some(loader) => loader
                .load_context(target, &session.session_id, init_data.as_ref())
                .await
                .map_err(|e| OrchestratorError::Store(crate::errors::StoreError::Backend(
                    format!("context loader for '{}' failed: {}", target, e),
                )))?,
            None => WorkflowContext::skeletal(target, workflow.capabilities.clone(), init_data),
        };

        session.workflow_context = Some(context);
        session.active_workflow = Some(target.to_string());
        session.current_context = target.to_string();
        session.touch_recent_workflow(target);
        tracing::debug!(
            "Session {} switched to workflow '{}'",
            session.session_id,
            target
        );
        Ok(())
    }

    /// Stamps the current step and completion percentage and records a
    /// `progress_update` history entry. The percentage is clamped to
    /// `[0, 100]`.
    ///
    /// # Errors
    /// `NoActiveWorkflow` when the session has no workflow context.
    pub fn update_workflow_progress(
        &self,
        session: &mut UserSession,
        step: &str,
        percentage: f64,
    ) -> Result<(), OrchestratorError> {
        let session_id = session.session_id.clone();
        let context = session
            .workflow_context
            .as_mut()
            .ok_or(OrchestratorError::NoActiveWorkflow(session_id))?;

        let percentage = percentage.clamp(0.0, 100.0);
        context.state.current_step = step.to_string();
        context.state.metadata.completion_percentage = percentage;
        context.state.metadata.last_modified = Utc::now();
        context.history.push(HistoryEntry {
            action: "progress_update".to_string(),
            timestamp: Utc::now(),
            details: json!({ "step": step, "percentage": percentage }),
        });
        Ok(())
    }

    /// Builds a checkpoint from the current step, appends it to both
    /// checkpoint lists, and records a `checkpoint_added` history entry.
    pub fn add_workflow_checkpoint(
        &self,
        session: &mut UserSession,
        description: Option<String>,
        data: Option<Value>,
    ) -> Result<Checkpoint, OrchestratorError> {
        let session_id = session.session_id.clone();
        let context = session
            .workflow_context
            .as_mut()
            .ok_or(OrchestratorError::NoActiveWorkflow(session_id))?;

        let checkpoint = Checkpoint {
            id: format!("checkpoint_{}", Utc::now().timestamp_millis()),
            timestamp: Utc::now(),
            step: context.state.current_step.clone(),
            description: description.clone(),
            data: data.unwrap_or_else(|| json!({})),
        };

        context.state.checkpoints.push(checkpoint.clone());
        context.checkpoints.push(checkpoint.clone());
        context.history.push(HistoryEntry {
            action: "checkpoint_added".to_string(),
            timestamp: Utc::now(),
            details: json!({
                "checkpointId": checkpoint.id.clone(),
                "description": description,
            }),
        });
        Ok(checkpoint)
    }
}
