//! Plugin lifecycle and the capability registries.
//!
//! The host owns every plugin from `register()` until `shutdown()`, together
//! with the tool/resource/prompt registries their initializers fill. Tools
//! and prompts are keyed `"{plugin_id}:{name}"`; the kernel never exposes
//! bare names. Resources are keyed by their uri, globally unique across
//! plugins.
//!
//! Registry writes happen only during plugin registration (startup) and
//! shutdown, never during normal request serving; reads are concurrent.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::PluginConfigMap;
use crate::errors::RegistrationError;
use crate::plugins::{
    Plugin, PluginLogger, PluginMetadata, PromptDefinition, ResourceDefinition, ToolDefinition,
};

/// A registered tool together with its owning plugin id.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub plugin_id: String,
    pub def: ToolDefinition,
}

/// A registered resource together with its owning plugin id.
#[derive(Debug, Clone)]
pub struct RegisteredResource {
    pub plugin_id: String,
    pub def: ResourceDefinition,
}

/// A registered prompt together with its owning plugin id.
#[derive(Debug, Clone)]
pub struct RegisteredPrompt {
    pub plugin_id: String,
    pub def: PromptDefinition,
}

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    metadata: PluginMetadata,
}

/// The subsystem that owns plugin lifecycle and the capability registries.
pub struct PluginHost {
    /// Registration order is preserved; shutdown drains in reverse.
    plugins: RwLock<Vec<PluginEntry>>,
    tools: RwLock<HashMap<String, RegisteredTool>>,
    resources: RwLock<HashMap<String, RegisteredResource>>,
    prompts: RwLock<HashMap<String, RegisteredPrompt>>,
    /// Per-process scratch cache `workflow_id -> opaque state`. The
    /// orchestrator's session-bound workflow state is canonical; this map
    /// only backs the call-context accessors between requests.
    workflow_states: Mutex<HashMap<String, Value>>,
    plugin_config: PluginConfigMap,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field(
                "workflow_states",
                &format_args!(
                    "<{} entries>",
                    self.workflow_states.lock().map(|m| m.len()).unwrap_or(0)
                ),
            )
            .finish()
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new(PluginConfigMap::new())
    }
}

impl PluginHost {
    pub fn new(plugin_config: PluginConfigMap) -> Self {
        Self {
            plugins: RwLock::new(Vec::new()),
            tools: RwLock::new(HashMap::new()),
            resources: RwLock::new(HashMap::new()),
            prompts: RwLock::new(HashMap::new()),
            workflow_states: Mutex::new(HashMap::new()),
            plugin_config,
        }
    }

    /// Registers a plugin and runs its `initialize` against a fresh
    /// registration context.
    ///
    /// The context is sealed once `initialize` returns; a failed initializer
    /// rolls back everything the plugin managed to register.
    ///
    /// # Errors
    /// - `EmptyPluginId` / `DuplicatePlugin` before `initialize` runs
    /// - `InitFailed` wrapping the plugin's own failure
    /// - Any registration error the initializer propagated
    pub async fn register(
        self: &Arc<Self>,
        plugin: Arc<dyn Plugin>,
    ) -> Result<(), RegistrationError> {
        let metadata = plugin.metadata().clone();
        if metadata.id.trim().is_empty() {
            return Err(RegistrationError::EmptyPluginId);
        }
        {
            let plugins = self.plugins.read().await;
            if plugins.iter().any(|e| e.metadata.id == metadata.id) {
                return Err(RegistrationError::DuplicatePlugin(metadata.id));
            }
        }

        let ctx = RegistrationContext {
            host: Arc::clone(self),
            plugin_id: metadata.id.clone(),
            config: self
                .plugin_config
                .get(&metadata.id)
                .cloned()
                .unwrap_or_default(),
            sealed: AtomicBool::new(false),
        };

        tracing::debug!("Initializing plugin '{}'", metadata.id);
        if let Err(e) = plugin.initialize(&ctx).await {
            self.remove_registrations(&metadata.id).await;
            return match e.downcast::<RegistrationError>() {
                Ok(reg) => Err(reg),
                Err(other) => Err(RegistrationError::InitFailed(other.to_string())),
            };
        }
        ctx.seal();

        tracing::info!(
            "Plugin '{}' v{} registered",
            metadata.id,
            metadata.version
        );
        self.plugins.write().await.push(PluginEntry { plugin, metadata });
        Ok(())
    }

    /// Shuts down every plugin in reverse registration order and clears the
    /// registrations tied to each. Shutdown failures are logged and do not
    /// stop the drain.
    pub async fn shutdown(&self) {
        let mut plugins = self.plugins.write().await;
        while let Some(entry) = plugins.pop() {
            tracing::debug!("Shutting down plugin '{}'", entry.metadata.id);
            if let Err(e) = entry.plugin.shutdown().await {
                tracing::error!("Plugin '{}' shutdown failed: {}", entry.metadata.id, e);
            }
            drop(entry.plugin);
            self.remove_registrations(&entry.metadata.id).await;
        }
    }

    async fn remove_registrations(&self, plugin_id: &str) {
        self.tools
            .write()
            .await
            .retain(|_, t| t.plugin_id != plugin_id);
        self.resources
            .write()
            .await
            .retain(|_, r| r.plugin_id != plugin_id);
        self.prompts
            .write()
            .await
            .retain(|_, p| p.plugin_id != plugin_id);
    }

    pub async fn plugin_count(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// Looks up a tool by its namespaced `"{plugin_id}:{name}"` key.
    pub async fn tool(&self, key: &str) -> Option<RegisteredTool> {
        self.tools.read().await.get(key).cloned()
    }

    /// All registered tools as `(key, entry)` pairs.
    pub async fn tools(&self) -> Vec<(String, RegisteredTool)> {
        self.tools
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn resource(&self, uri: &str) -> Option<RegisteredResource> {
        self.resources.read().await.get(uri).cloned()
    }

    pub async fn resources(&self) -> Vec<RegisteredResource> {
        self.resources.read().await.values().cloned().collect()
    }

    /// Looks up a prompt by its namespaced `"{plugin_id}:{name}"` key.
    pub async fn prompt(&self, key: &str) -> Option<RegisteredPrompt> {
        self.prompts.read().await.get(key).cloned()
    }

    pub async fn prompts(&self) -> Vec<(String, RegisteredPrompt)> {
        self.prompts
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Scratch workflow state under `workflow_id`, if any.
    pub fn workflow_state(&self, workflow_id: &str) -> Option<Value> {
        self.workflow_states
            .lock()
            .ok()
            .and_then(|m| m.get(workflow_id).cloned())
    }

    /// Replaces the scratch state under `workflow_id`. Reserved for kernel
    /// internals and the call-context write path; plugins go through
    /// `CallContext::update_workflow_state`.
    pub(crate) fn set_workflow_state(&self, workflow_id: &str, state: Value) {
        if let Ok(mut m) = self.workflow_states.lock() {
            m.insert(workflow_id.to_string(), state);
        }
    }

    /// Plugin configuration map for `plugin_id`.
    pub fn config_for(&self, plugin_id: &str) -> BTreeMap<String, String> {
        self.plugin_config
            .get(plugin_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// The short-lived object a plugin registers its capabilities through.
///
/// Valid only for the duration of `Plugin::initialize`; the host seals it
/// afterwards and later registration attempts fail with
/// `RegistrationError::Sealed`.
pub struct RegistrationContext {
    host: Arc<PluginHost>,
    plugin_id: String,
    config: BTreeMap<String, String>,
    sealed: AtomicBool,
}

impl RegistrationContext {
    fn check_open(&self) -> Result<(), RegistrationError> {
        if self.sealed.load(Ordering::SeqCst) {
            return Err(RegistrationError::Sealed(self.plugin_id.clone()));
        }
        Ok(())
    }

    fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    /// The id the host is registering this plugin under.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// The plugin's configuration map from the server config.
    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    /// Logger namespaced to this plugin.
    pub fn logger(&self) -> PluginLogger {
        PluginLogger::new(&self.plugin_id)
    }

    /// Registers a tool under `"{plugin_id}:{name}"`.
    ///
    /// # Errors
    /// - `Sealed` outside the initialization phase
    /// - `MissingHandler` is prevented by construction (`ToolDefinition`
    ///   always carries a handler); the builder raises it instead
    /// - `RequiredNotDeclared` when `required` names an undeclared property
    /// - `DuplicateTool` on key collision
    pub async fn register_tool(&self, def: ToolDefinition) -> Result<(), RegistrationError> {
        self.check_open()?;
        for field in &def.input_schema.required {
            if !def.input_schema.properties.contains_key(field) {
                return Err(RegistrationError::RequiredNotDeclared {
                    tool: def.name.clone(),
                    field: field.clone(),
                });
            }
        }
        let key = format!("{}:{}", self.plugin_id, def.name);
        let mut tools = self.host.tools.write().await;
        if tools.contains_key(&key) {
            return Err(RegistrationError::DuplicateTool(key));
        }
        tracing::debug!("Registered tool '{}'", key);
        tools.insert(
            key,
            RegisteredTool {
                plugin_id: self.plugin_id.clone(),
                def,
            },
        );
        Ok(())
    }

    /// Registers a resource under its bare uri. Collisions across plugins
    /// are failures.
    pub async fn register_resource(
        &self,
        def: ResourceDefinition,
    ) -> Result<(), RegistrationError> {
        self.check_open()?;
        let mut resources = self.host.resources.write().await;
        if resources.contains_key(&def.uri) {
            return Err(RegistrationError::DuplicateResource(def.uri.clone()));
        }
        tracing::debug!("Registered resource '{}'", def.uri);
        resources.insert(
            def.uri.clone(),
            RegisteredResource {
                plugin_id: self.plugin_id.clone(),
                def,
            },
        );
        Ok(())
    }

    /// Registers a prompt under `"{plugin_id}:{name}"`.
    pub async fn register_prompt(&self, def: PromptDefinition) -> Result<(), RegistrationError> {
        self.check_open()?;
        let key = format!("{}:{}", self.plugin_id, def.name);
        let mut prompts = self.host.prompts.write().await;
        if prompts.contains_key(&key) {
            return Err(RegistrationError::DuplicatePrompt(key));
        }
        tracing::debug!("Registered prompt '{}'", key);
        prompts.insert(
            key,
            RegisteredPrompt {
                plugin_id: self.plugin_id.clone(),
                def,
            },
        );
        Ok(())
    }
}
