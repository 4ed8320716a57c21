//! Per-request context and the call context handed to handlers.
//!
//! The kernel constructs one [`CallContext`] per dispatch and threads it
//! explicitly through the middleware pipeline and into the handler. There is
//! no process-global "current request": concurrent dispatches cannot observe
//! each other's contexts. Handlers must treat the request context as
//! immutable and must not retain the call context beyond the handler scope.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugins::PluginLogger;
use crate::plugins::host::PluginHost;

/// Scope: one request. Pushed by the kernel on entry, torn down on exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequestContext {
    pub session_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// The short-lived object passed to every tool/resource/prompt handler.
///
/// Grants the handler a namespaced logger, the request metadata, the
/// plugin's configuration map, and the workflow-state accessors. Capability
/// registration is deliberately absent here: registering happens only
/// through the sealed registration context during plugin initialization.
#[derive(Clone)]
pub struct CallContext {
    request: Option<UserRequestContext>,
    logger: PluginLogger,
    host: Arc<PluginHost>,
    config: BTreeMap<String, String>,
}

impl CallContext {
    pub(crate) fn new(
        request: Option<UserRequestContext>,
        plugin_id: &str,
        host: Arc<PluginHost>,
        config: BTreeMap<String, String>,
    ) -> Self {
        Self {
            request,
            logger: PluginLogger::new(plugin_id),
            host,
            config,
        }
    }

    /// The currently-pushed request context, if the transport carried
    /// session identity.
    pub fn request_context(&self) -> Option<&UserRequestContext> {
        self.request.as_ref()
    }

    /// Logger namespaced to the plugin that owns the running handler.
    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    /// The plugin's configuration map from the server config.
    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    /// The scratch state stored under the request's current workflow, or
    /// `None` when no workflow is active.
    ///
    /// This reads the host's per-process scratch cache; the orchestrator's
    /// session-bound workflow state is the canonical copy.
    pub fn workflow_state(&self) -> Option<Value> {
        let workflow = self.current_workflow()?;
        self.host.workflow_state(&workflow)
    }

    /// Replaces the scratch state under the current workflow. No-op when no
    /// workflow is active. This is the only supported in-request write path.
    pub fn update_workflow_state(&self, state: Value) {
        if let Some(workflow) = self.current_workflow() {
            self.host.set_workflow_state(&workflow, state);
        }
    }

    fn current_workflow(&self) -> Option<String> {
        self.request
            .as_ref()
            .and_then(|r| r.current_workflow.clone())
    }
}
