//! Request dispatch over the plugin registries.
//!
//! `ServerKernel::dispatch` is the single entry point every transport feeds.
//! It answers the MCP registry methods (`tools/*`, `resources/*`,
//! `prompts/*`) plus the `initialize` handshake, builds the per-call context,
//! and wraps every `tools/call` in the middleware pipeline. Resource and
//! prompt calls bypass the pipeline unless
//! `middleware.cover_resources_and_prompts` is set, matching the upstream
//! platform's coverage.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::middleware::{CallScope, MiddlewarePipeline};
use crate::orchestrator::Orchestrator;
use crate::plugins::host::PluginHost;
use crate::protocol::{
    InboundRequest, JsonRpcResponse, PROTOCOL_VERSION, RpcErrorObject,
};
use crate::server::context::{CallContext, UserRequestContext};

/// The protocol state machine between transports and the plugin host.
pub struct ServerKernel {
    name: String,
    version: String,
    host: Arc<PluginHost>,
    pipeline: MiddlewarePipeline,
    orchestrator: Option<Arc<Orchestrator>>,
    cover_resources_and_prompts: bool,
}

impl ServerKernel {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        host: Arc<PluginHost>,
        pipeline: MiddlewarePipeline,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            host,
            pipeline,
            orchestrator: None,
            cover_resources_and_prompts: false,
        }
    }

    /// Wires the orchestrator into the request path: inbound messages run
    /// through intent detection before tool resolution, so handlers observe
    /// the post-switch workflow.
    pub fn with_orchestrator(mut self, orchestrator: Arc<Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Extends the middleware pipeline over `resources/read` and
    /// `prompts/get`.
    pub fn with_symmetric_middleware(mut self, enabled: bool) -> Self {
        self.cover_resources_and_prompts = enabled;
        self
    }

    pub fn host(&self) -> &Arc<PluginHost> {
        &self.host
    }

    pub fn orchestrator(&self) -> Option<&Arc<Orchestrator>> {
        self.orchestrator.as_ref()
    }

    /// Dispatches one normalized request; `None` for notifications.
    pub async fn dispatch(&self, req: InboundRequest) -> Option<JsonRpcResponse> {
        let id = req.id.clone();
        let is_notification = req.is_notification();
        tracing::debug!("Dispatching method '{}'", req.method);

        let outcome = match req.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "notifications/initialized" => return None,
            "tools/list" => Ok(self.tools_list().await),
            "tools/call" => self.tools_call(&req).await,
            "resources/list" => Ok(self.resources_list().await),
            "resources/read" => self.resources_read(&req).await,
            "prompts/list" => Ok(self.prompts_list().await),
            "prompts/get" => self.prompts_get(&req).await,
            other => Err(RpcErrorObject::method_not_found(format!(
                "Method not found: {}",
                other
            ))),
        };

        if is_notification {
            if let Err(e) = outcome {
                tracing::warn!("Notification '{}' failed: {}", req.method, e.message);
            }
            return None;
        }

        Some(match outcome {
            Ok(result) => JsonRpcResponse::ok(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": {},
                "prompts": {},
            },
            "serverInfo": {
                "name": self.name,
                "version": self.version,
            },
        })
    }

    async fn tools_list(&self) -> Value {
        let mut tools = self.host.tools().await;
        tools.sort_by(|a, b| a.0.cmp(&b.0));
        let tools: Vec<Value> = tools
            .into_iter()
            .map(|(key, tool)| {
                json!({
                    "name": key,
                    "description": tool.def.description,
                    "inputSchema": tool.def.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn tools_call(&self, req: &InboundRequest) -> Result<Value, RpcErrorObject> {
        let name = req
            .params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcErrorObject::invalid_params("Missing tool name"))?
            .to_string();
        let arguments = req
            .params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        // Route the message through the orchestrator first so the resolved
        // tool observes the post-switch workflow.
        let request_ctx = self.build_request_context(req).await?;

        let tool = self
            .host
            .tool(&name)
            .await
            .ok_or_else(|| RpcErrorObject::method_not_found(format!("Tool not found: {}", name)))?;

        let call_ctx = CallContext::new(
            request_ctx,
            &tool.plugin_id,
            Arc::clone(&self.host),
            self.host.config_for(&tool.plugin_id),
        );
        let scope = CallScope {
            session_id: req.session_id.clone(),
            user_id: req.user_id.clone(),
        };

        let handler = Arc::clone(&tool.def.handler);
        let handler_args = arguments.clone();
        let result = self
            .pipeline
            .execute(&name, &arguments, &scope, async move {
                handler(handler_args, call_ctx).await
            })
            .await
            .map_err(|e| RpcErrorObject::internal(e.to_string()))?;

        Ok(json!({
            "content": [{ "type": "text", "text": render_text(&result) }],
        }))
    }

    async fn resources_list(&self) -> Value {
        let mut resources = self.host.resources().await;
        resources.sort_by(|a, b| a.def.uri.cmp(&b.def.uri));
        let resources: Vec<Value> = resources
            .into_iter()
            .map(|r| {
                let mut entry = json!({
                    "uri": r.def.uri,
                    "name": r.def.name,
                    "description": r.def.description,
                });
                if let Some(mime) = &r.def.mime_type {
                    entry["mimeType"] = json!(mime);
                }
                entry
            })
            .collect();
        json!({ "resources": resources })
    }

    async fn resources_read(&self, req: &InboundRequest) -> Result<Value, RpcErrorObject> {
        let uri = req
            .params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcErrorObject::invalid_params("Missing resource uri"))?
            .to_string();

        let resource = self.host.resource(&uri).await.ok_or_else(|| {
            RpcErrorObject::invalid_request(format!("Resource not found: {}", uri))
        })?;

        let request_ctx = self.build_request_context(req).await?;
        let call_ctx = CallContext::new(
            request_ctx,
            &resource.plugin_id,
            Arc::clone(&self.host),
            self.host.config_for(&resource.plugin_id),
        );

        let handler = Arc::clone(&resource.def.handler);
        let payload = if self.cover_resources_and_prompts {
            let scope = CallScope {
                session_id: req.session_id.clone(),
                user_id: req.user_id.clone(),
            };
            self.pipeline
                .execute(&uri, &req.params, &scope, async move {
                    handler(call_ctx).await
                })
                .await
        } else {
            handler(call_ctx).await
        }
        .map_err(|e| RpcErrorObject::internal(e.to_string()))?;

        Ok(json!({
            "contents": [{
                "uri": uri,
                "mimeType": resource.def.mime_type.as_deref().unwrap_or("text/plain"),
                "text": render_text(&payload),
            }],
        }))
    }

    async fn prompts_list(&self) -> Value {
        let mut prompts = self.host.prompts().await;
        prompts.sort_by(|a, b| a.0.cmp(&b.0));
        let prompts: Vec<Value> = prompts
            .into_iter()
            .map(|(key, prompt)| {
                json!({
                    "name": key,
                    "description": prompt.def.description,
                    "arguments": prompt.def.arguments,
                })
            })
            .collect();
        json!({ "prompts": prompts })
    }

    async fn prompts_get(&self, req: &InboundRequest) -> Result<Value, RpcErrorObject> {
        let name = req
            .params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcErrorObject::invalid_params("Missing prompt name"))?
            .to_string();
        let arguments = req
            .params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let prompt = self
            .host
            .prompt(&name)
            .await
            .ok_or_else(|| RpcErrorObject::invalid_request(format!("Prompt not found: {}", name)))?;

        let request_ctx = self.build_request_context(req).await?;
        let call_ctx = CallContext::new(
            request_ctx,
            &prompt.plugin_id,
            Arc::clone(&self.host),
            self.host.config_for(&prompt.plugin_id),
        );

        let handler = Arc::clone(&prompt.def.handler);
        let description = prompt.def.description.clone();
        let payload = if self.cover_resources_and_prompts {
            let scope = CallScope {
                session_id: req.session_id.clone(),
                user_id: req.user_id.clone(),
            };
            let args = arguments.clone();
            self.pipeline
                .execute(&name, &arguments, &scope, async move {
                    let payload = handler(args, call_ctx).await?;
                    Ok(serde_json::to_value(payload)?)
                })
                .await
                .map_err(|e| RpcErrorObject::internal(e.to_string()))?
        } else {
            let payload = handler(arguments, call_ctx)
                .await
                .map_err(|e| RpcErrorObject::internal(e.to_string()))?;
            serde_json::to_value(payload)
                .map_err(|e| RpcErrorObject::internal(e.to_string()))?
        };

        Ok(json!({
            "description": description,
            "messages": payload.get("messages").cloned().unwrap_or_else(|| json!([])),
        }))
    }

    /// Builds the per-request context, routing the user message through the
    /// orchestrator first when one is attached.
    async fn build_request_context(
        &self,
        req: &InboundRequest,
    ) -> Result<Option<UserRequestContext>, RpcErrorObject> {
        let mut session_id = req.session_id.clone();
        let mut current_workflow = req.workflow_id.clone();

        if let (Some(orchestrator), Some(message)) = (&self.orchestrator, &req.message) {
            let user_id = req.user_id.as_deref().unwrap_or("anonymous");
            let outcome = orchestrator
                .process_message(message, session_id.as_deref(), user_id, user_id)
                .await
                .map_err(|e| RpcErrorObject::internal(e.to_string()))?;
            session_id = Some(outcome.session.session_id.clone());
            current_workflow = outcome.session.active_workflow.clone();
        }

        if session_id.is_none() && req.user_id.is_none() {
            return Ok(None);
        }

        Ok(Some(UserRequestContext {
            session_id: session_id.unwrap_or_else(|| "anonymous".to_string()),
            user_id: req
                .user_id
                .clone()
                .unwrap_or_else(|| "anonymous".to_string()),
            current_workflow,
            message: req.message.clone(),
            timestamp: chrono::Utc::now(),
            metadata: Some(json!({
                "transport": req.metadata.transport.as_str(),
                "userAgent": req.metadata.user_agent,
                "peerAddr": req.metadata.peer_addr,
                "connectionId": req.metadata.connection_id,
            })),
        }))
    }
}

/// Strings pass through untouched; everything else is JSON-rendered.
fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
