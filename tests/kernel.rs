use std::sync::Arc;

use serde_json::{Value, json};

use harbor::errors::RegistrationError;
use harbor::middleware::MiddlewarePipeline;
use harbor::plugins::builder::ToolBuilder;
use harbor::plugins::builtin::EchoPlugin;
use harbor::plugins::host::{PluginHost, RegistrationContext};
use harbor::plugins::{InputSchema, Plugin, PluginMetadata, ToolDefinition};
use harbor::protocol::{
    INTERNAL_ERROR, INVALID_REQUEST, METHOD_NOT_FOUND, InboundRequest, JsonRpcRequest,
    RequestMetadata, TransportKind,
};
use harbor::server::ServerKernel;

fn request(method: &str, params: Value) -> InboundRequest {
    InboundRequest::from_envelope(
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params: Some(params),
        },
        RequestMetadata::for_transport(TransportKind::Stdio),
    )
}

async fn kernel_with_builtin() -> ServerKernel {
    let host = Arc::new(PluginHost::default());
    host.register(Arc::new(EchoPlugin::new())).await.expect("register builtin");
    ServerKernel::new("harbor-test", "0.0.0", host, MiddlewarePipeline::new())
}

/// A plugin whose single tool always fails, for error-path coverage.
struct FailingPlugin {
    metadata: PluginMetadata,
}

impl FailingPlugin {
    fn new() -> Self {
        Self {
            metadata: PluginMetadata::new("flaky", "Flaky plugin", "0.0.0", "Always fails"),
        }
    }
}

#[async_trait::async_trait]
impl Plugin for FailingPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self, ctx: &RegistrationContext) -> anyhow::Result<()> {
        let tool = ToolBuilder::new("explode")
            .description("Fails on purpose")
            .handler(|_, _| async { anyhow::bail!("the handler exploded") })
            .build()?;
        ctx.register_tool(tool).await?;
        Ok(())
    }
}

#[tokio::test]
async fn tools_list_exposes_namespaced_echo() {
    let kernel = kernel_with_builtin().await;
    let response = kernel.dispatch(request("tools/list", json!({}))).await.unwrap();
    let result = response.result.unwrap();

    let tools = result["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], json!("demo:echo"));
    assert_eq!(tools[0]["inputSchema"]["type"], json!("object"));
    assert_eq!(
        tools[0]["inputSchema"]["properties"]["text"]["type"],
        json!("string")
    );
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["text"]));
}

#[tokio::test]
async fn tools_list_on_empty_registry_is_empty_not_error() {
    let host = Arc::new(PluginHost::default());
    let kernel = ServerKernel::new("harbor-test", "0.0.0", host, MiddlewarePipeline::new());
    let response = kernel.dispatch(request("tools/list", json!({}))).await.unwrap();
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap(), json!({ "tools": [] }));
}

#[tokio::test]
async fn echo_call_round_trips() {
    let kernel = kernel_with_builtin().await;
    let response = kernel
        .dispatch(request(
            "tools/call",
            json!({ "name": "demo:echo", "arguments": { "text": "hi" } }),
        ))
        .await
        .unwrap();
    let result = response.result.unwrap();
    assert_eq!(result["content"][0]["type"], json!("text"));
    assert_eq!(result["content"][0]["text"], json!("hi"));
}

#[tokio::test]
async fn unknown_tool_is_method_not_found() {
    let kernel = kernel_with_builtin().await;
    let response = kernel
        .dispatch(request(
            "tools/call",
            json!({ "name": "demo:nope", "arguments": {} }),
        ))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, METHOD_NOT_FOUND);
    assert_eq!(error.message, "Tool not found: demo:nope");
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let kernel = kernel_with_builtin().await;
    let response = kernel.dispatch(request("tools/destroy", json!({}))).await.unwrap();
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn handler_failure_surfaces_as_internal_error() {
    let host = Arc::new(PluginHost::default());
    host.register(Arc::new(FailingPlugin::new())).await.unwrap();
    let kernel = ServerKernel::new("harbor-test", "0.0.0", host, MiddlewarePipeline::new());

    let response = kernel
        .dispatch(request(
            "tools/call",
            json!({ "name": "flaky:explode", "arguments": {} }),
        ))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, INTERNAL_ERROR);
    assert!(error.message.contains("the handler exploded"));
}

#[tokio::test]
async fn non_string_results_are_json_rendered() {
    let host = Arc::new(PluginHost::default());

    struct JsonPlugin {
        metadata: PluginMetadata,
    }
    #[async_trait::async_trait]
    impl Plugin for JsonPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }
        async fn initialize(&self, ctx: &RegistrationContext) -> anyhow::Result<()> {
            let tool = ToolBuilder::new("stats")
                .description("Returns a JSON object")
                .handler(|_, _| async { Ok(json!({ "count": 3 })) })
                .build()?;
            ctx.register_tool(tool).await?;
            Ok(())
        }
    }

    host.register(Arc::new(JsonPlugin {
        metadata: PluginMetadata::new("data", "Data plugin", "0.0.0", "Numbers"),
    }))
    .await
    .unwrap();
    let kernel = ServerKernel::new("harbor-test", "0.0.0", host, MiddlewarePipeline::new());

    let response = kernel
        .dispatch(request(
            "tools/call",
            json!({ "name": "data:stats", "arguments": {} }),
        ))
        .await
        .unwrap();
    let text = response.result.unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(
        serde_json::from_str::<Value>(&text).unwrap(),
        json!({ "count": 3 })
    );
}

#[tokio::test]
async fn resources_read_returns_contents() {
    let kernel = kernel_with_builtin().await;
    let listing = kernel
        .dispatch(request("resources/list", json!({})))
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(listing["resources"][0]["uri"], json!("demo://about"));

    let response = kernel
        .dispatch(request("resources/read", json!({ "uri": "demo://about" })))
        .await
        .unwrap();
    let contents = &response.result.unwrap()["contents"][0];
    assert_eq!(contents["uri"], json!("demo://about"));
    assert_eq!(contents["mimeType"], json!("text/plain"));
    assert!(contents["text"].as_str().unwrap().contains("Harbor"));
}

#[tokio::test]
async fn unknown_resource_is_invalid_request() {
    let kernel = kernel_with_builtin().await;
    let response = kernel
        .dispatch(request("resources/read", json!({ "uri": "demo://missing" })))
        .await
        .unwrap();
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_REQUEST);
    assert_eq!(error.message, "Resource not found: demo://missing");
}

#[tokio::test]
async fn prompts_round_trip() {
    let kernel = kernel_with_builtin().await;
    let listing = kernel
        .dispatch(request("prompts/list", json!({})))
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(listing["prompts"][0]["name"], json!("demo:greeting"));

    let response = kernel
        .dispatch(request(
            "prompts/get",
            json!({ "name": "demo:greeting", "arguments": { "name": "Ada" } }),
        ))
        .await
        .unwrap();
    let result = response.result.unwrap();
    let text = result["messages"][0]["content"]["text"].as_str().unwrap();
    assert!(text.contains("Ada"));

    let missing = kernel
        .dispatch(request("prompts/get", json!({ "name": "demo:missing" })))
        .await
        .unwrap();
    assert_eq!(missing.error.unwrap().code, INVALID_REQUEST);
}

#[tokio::test]
async fn initialize_reports_server_identity() {
    let kernel = kernel_with_builtin().await;
    let result = kernel
        .dispatch(request("initialize", json!({})))
        .await
        .unwrap()
        .result
        .unwrap();
    assert_eq!(result["serverInfo"]["name"], json!("harbor-test"));
    assert!(result["protocolVersion"].is_string());
}

#[tokio::test]
async fn notifications_produce_no_response() {
    let kernel = kernel_with_builtin().await;
    let notification = InboundRequest::from_envelope(
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        },
        RequestMetadata::for_transport(TransportKind::Stdio),
    );
    assert!(kernel.dispatch(notification).await.is_none());
}

#[tokio::test]
async fn register_then_shutdown_restores_registries() {
    let host = Arc::new(PluginHost::default());
    host.register(Arc::new(EchoPlugin::new())).await.unwrap();
    assert_eq!(host.plugin_count().await, 1);
    assert_eq!(host.tool_count().await, 1);

    host.shutdown().await;
    assert_eq!(host.plugin_count().await, 0);
    assert_eq!(host.tool_count().await, 0);
    assert!(host.resources().await.is_empty());
    assert!(host.prompts().await.is_empty());
}

#[tokio::test]
async fn load_plugins_falls_back_to_builtin() {
    let host = Arc::new(PluginHost::default());
    harbor::plugins::load_plugins(&host, Vec::new()).await.unwrap();
    assert!(host.tool("demo:echo").await.is_some());
}

#[tokio::test]
async fn duplicate_plugin_id_is_rejected() {
    let host = Arc::new(PluginHost::default());
    host.register(Arc::new(EchoPlugin::new())).await.unwrap();
    let err = host.register(Arc::new(EchoPlugin::new())).await.unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicatePlugin(id) if id == "demo"));
    // The first registration survives intact.
    assert_eq!(host.tool_count().await, 1);
}

#[tokio::test]
async fn plugin_config_reaches_handlers() {
    use std::collections::BTreeMap;

    struct ConfiguredPlugin {
        metadata: PluginMetadata,
    }
    #[async_trait::async_trait]
    impl Plugin for ConfiguredPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }
        async fn initialize(&self, ctx: &RegistrationContext) -> anyhow::Result<()> {
            assert_eq!(ctx.config().get("region").map(String::as_str), Some("eu"));
            let tool = ToolBuilder::new("region")
                .description("Reports the configured region")
                .handler(|_, ctx| async move {
                    let region = ctx
                        .config()
                        .get("region")
                        .cloned()
                        .unwrap_or_else(|| "unset".to_string());
                    Ok(Value::String(region))
                })
                .build()?;
            ctx.register_tool(tool).await?;
            Ok(())
        }
    }

    let mut plugin_config = BTreeMap::new();
    plugin_config.insert(
        "cfg".to_string(),
        BTreeMap::from([("region".to_string(), "eu".to_string())]),
    );
    let host = Arc::new(PluginHost::new(plugin_config));
    host.register(Arc::new(ConfiguredPlugin {
        metadata: PluginMetadata::new("cfg", "Configured plugin", "0.0.0", "Reads config"),
    }))
    .await
    .unwrap();
    let kernel = ServerKernel::new("harbor-test", "0.0.0", host, MiddlewarePipeline::new());

    let response = kernel
        .dispatch(request(
            "tools/call",
            json!({ "name": "cfg:region", "arguments": {} }),
        ))
        .await
        .unwrap();
    assert_eq!(
        response.result.unwrap()["content"][0]["text"],
        json!("eu")
    );
}

#[tokio::test]
async fn required_field_must_be_declared() {
    struct BadSchemaPlugin {
        metadata: PluginMetadata,
    }
    #[async_trait::async_trait]
    impl Plugin for BadSchemaPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }
        async fn initialize(&self, ctx: &RegistrationContext) -> anyhow::Result<()> {
            let mut schema = InputSchema::empty();
            schema.required.push("ghost".to_string());
            ctx.register_tool(ToolDefinition {
                name: "bad".to_string(),
                description: "Requires an undeclared field".to_string(),
                input_schema: schema,
                handler: Arc::new(|_, _| Box::pin(async { Ok(Value::Null) })),
            })
            .await?;
            Ok(())
        }
    }

    let host = Arc::new(PluginHost::default());
    let err = host
        .register(Arc::new(BadSchemaPlugin {
            metadata: PluginMetadata::new("bad", "Bad plugin", "0.0.0", "Broken schema"),
        }))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::RequiredNotDeclared { ref field, .. } if field == "ghost"
    ));
    // A failed initializer leaves nothing behind.
    assert_eq!(host.tool_count().await, 0);
    assert_eq!(host.plugin_count().await, 0);
}
