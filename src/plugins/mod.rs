//! Plugin model and capability definitions for Harbor.
//!
//! This module provides the core plugin system for the Harbor MCP server:
//! - The `Plugin` capability set (metadata + initialize + optional shutdown)
//! - Tool / resource / prompt definition records and their handler types
//! - The namespaced per-plugin logger
//! - Built-in plugin fallback when no plugins are configured
//!
//! # Architecture
//!
//! Plugins are composed, not inherited: a plugin is any object implementing
//! `Plugin`, and it *uses* the helpers in `builder` and `validation` rather
//! than extending a base class. During `initialize` a plugin registers its
//! capabilities through the short-lived `RegistrationContext` handed to it by
//! the host; the context is sealed once `initialize` returns.
//!
//! # Registration process
//!
//! 1. The host validates the plugin id (non-empty, unused)
//! 2. The plugin's `initialize` runs against a fresh registration context
//! 3. Tools and prompts land in the registries under `"{plugin_id}:{name}"`,
//!    resources under their bare uri
//! 4. The context is sealed; late registration attempts fail
//! 5. If nothing registered at startup, the built-in echo plugin is loaded

pub mod builder;
pub mod builtin;
pub mod host;
pub mod validation;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::server::context::CallContext;

/// Descriptive metadata for a plugin. `id` is the unique primary key and the
/// prefix of every tool and prompt the plugin registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl PluginMetadata {
    /// Minimal metadata with the required fields only.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: description.into(),
            author: None,
            license: None,
            repository: None,
            keywords: Vec::new(),
            category: None,
            homepage: None,
            dependencies: Vec::new(),
        }
    }
}

/// The plugin capability set.
///
/// Plugins must not mutate their metadata after registration, and must not
/// retain the registration context or any call context beyond the scope they
/// were handed it in.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// The plugin's descriptive metadata.
    fn metadata(&self) -> &PluginMetadata;

    /// Registers the plugin's tools, resources, and prompts.
    ///
    /// Called exactly once by the host; the context is sealed afterwards.
    async fn initialize(&self, ctx: &host::RegistrationContext) -> anyhow::Result<()>;

    /// Releases plugin-held resources. Failures are logged, not propagated.
    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Type alias for tool handlers (async). Handlers receive owned values to
/// avoid borrow/lifetime issues crossing await points.
pub type ToolHandler =
    Arc<dyn Fn(Value, CallContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Type alias for resource handlers.
pub type ResourceHandler =
    Arc<dyn Fn(CallContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Type alias for prompt handlers.
pub type PromptHandler = Arc<
    dyn Fn(Value, CallContext) -> BoxFuture<'static, anyhow::Result<PromptPayload>> + Send + Sync,
>;

/// JSON-Schema shape declared by a tool for its arguments.
///
/// Always an `"object"` schema; `required` must name a subset of
/// `properties` (checked at registration).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default)]
    pub additional_properties: bool,
}

impl InputSchema {
    /// An empty object schema accepting no declared properties.
    pub fn empty() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Map::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }
}

/// A named, schema-described operation exposed via `tools/call`.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    pub handler: ToolHandler,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("handler", &format_args!("<handler>"))
            .finish()
    }
}

/// A uri-addressed read-only payload exposed via `resources/read`.
#[derive(Clone)]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: Option<String>,
    pub handler: ResourceHandler,
}

impl std::fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .finish()
    }
}

/// One declared argument of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// The messages produced by a prompt handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPayload {
    pub messages: Vec<Value>,
}

/// A named, argument-taking generator of chat messages.
#[derive(Clone)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
    pub handler: PromptHandler,
}

impl std::fmt::Debug for PromptDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptDefinition")
            .field("name", &self.name)
            .field("arguments", &self.arguments.len())
            .finish()
    }
}

/// Logger handed to plugins; every record is prefixed with the plugin id.
/// Level filtering is inherited from the process-wide tracing filter.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin_id: String,
}

impl PluginLogger {
    pub fn new(plugin_id: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
        }
    }

    pub fn debug(&self, message: impl std::fmt::Display) {
        tracing::debug!("[{}] {}", self.plugin_id, message);
    }

    pub fn info(&self, message: impl std::fmt::Display) {
        tracing::info!("[{}] {}", self.plugin_id, message);
    }

    pub fn warn(&self, message: impl std::fmt::Display) {
        tracing::warn!("[{}] {}", self.plugin_id, message);
    }

    pub fn error(&self, message: impl std::fmt::Display) {
        tracing::error!("[{}] {}", self.plugin_id, message);
    }
}

/// Loads configured plugins into the host, falling back to the built-in echo
/// plugin when none register.
///
/// # Arguments
/// * `host` - The plugin host receiving registrations
/// * `plugins` - Plugin instances to register, in order
///
/// # Behavior
/// - Registers plugins in the order given; the first failure aborts startup
/// - Falls back to the built-in echo plugin if the registry ends up empty
pub async fn load_plugins(
    host: &Arc<host::PluginHost>,
    plugins: Vec<Arc<dyn Plugin>>,
) -> Result<(), crate::errors::RegistrationError> {
    tracing::debug!("Registering {} configured plugins", plugins.len());

    for plugin in plugins {
        host.register(plugin).await?;
    }

    if host.tool_count().await == 0 {
        tracing::warn!("No plugins registered any tools, loading builtin echo plugin");
        host.register(Arc::new(builtin::EchoPlugin::new())).await?;
    }

    Ok(())
}
