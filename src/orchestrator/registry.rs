//! Workflow definitions and the workflow registry.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A named interaction mode with triggers, capabilities, and state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Phrases that pull a conversation into this workflow.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Tool names available inside the workflow.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub required_context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_context: Option<Vec<String>>,
    /// Extra phrases (besides the built-in set) that exit the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_signals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            triggers: Vec::new(),
            capabilities: Vec::new(),
            required_context: Vec::new(),
            optional_context: None,
            exit_signals: None,
            category: None,
            tags: None,
        }
    }

    pub fn with_triggers(mut self, triggers: &[&str]) -> Self {
        self.triggers = triggers.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Registry of workflow definitions keyed by id.
///
/// Registration order is preserved: trigger matching reports candidates in
/// the order workflows were registered, which keeps intent detection a pure
/// function of (message, registry, active workflow).
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    workflows: HashMap<String, WorkflowDefinition>,
    order: Vec<String>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a workflow definition.
    pub fn register(&self, def: WorkflowDefinition) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        if !inner.workflows.contains_key(&def.id) {
            inner.order.push(def.id.clone());
        }
        tracing::debug!("Registered workflow '{}'", def.id);
        inner.workflows.insert(def.id.clone(), def);
    }

    pub fn get(&self, id: &str) -> Option<WorkflowDefinition> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .workflows
            .get(id)
            .cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .workflows
            .contains_key(id)
    }

    /// All definitions in registration order.
    pub fn all(&self) -> Vec<WorkflowDefinition> {
        let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
        inner
            .order
            .iter()
            .filter_map(|id| inner.workflows.get(id).cloned())
            .collect()
    }

    /// Workflows with any trigger contained in `text` (case-insensitive),
    /// in registration order.
    pub fn find_by_trigger(&self, text: &str) -> Vec<WorkflowDefinition> {
        let needle = text.to_lowercase();
        self.all()
            .into_iter()
            .filter(|w| {
                w.triggers
                    .iter()
                    .any(|t| needle.contains(&t.to_lowercase()))
            })
            .collect()
    }

    /// Workflows in a category, in registration order.
    pub fn find_by_category(&self, category: &str) -> Vec<WorkflowDefinition> {
        self.all()
            .into_iter()
            .filter(|w| w.category.as_deref() == Some(category))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .workflows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        inner.workflows.clear();
        inner.order.clear();
    }
}
