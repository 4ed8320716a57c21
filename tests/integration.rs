//! End-to-end: orchestrator wired into the kernel's request path.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use harbor::middleware::MiddlewarePipeline;
use harbor::orchestrator::Orchestrator;
use harbor::orchestrator::registry::WorkflowDefinition;
use harbor::orchestrator::store::InMemorySessionStore;
use harbor::plugins::builder::ToolBuilder;
use harbor::plugins::host::{PluginHost, RegistrationContext};
use harbor::plugins::{Plugin, PluginMetadata};
use harbor::protocol::{InboundRequest, JsonRpcRequest, RequestMetadata, TransportKind};
use harbor::server::ServerKernel;

/// Tools that surface the call context a workflow-aware plugin would see.
struct WorkflowToolsPlugin {
    metadata: PluginMetadata,
}

#[async_trait::async_trait]
impl Plugin for WorkflowToolsPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self, ctx: &RegistrationContext) -> anyhow::Result<()> {
        let current = ToolBuilder::new("current-workflow")
            .description("Names the workflow the call is running in")
            .handler(|_, ctx| async move {
                let workflow = ctx
                    .request_context()
                    .and_then(|r| r.current_workflow.clone())
                    .unwrap_or_else(|| "general".to_string());
                Ok(Value::String(workflow))
            })
            .build()?;
        ctx.register_tool(current).await?;

        let bump = ToolBuilder::new("bump")
            .description("Counts invocations in the workflow scratch state")
            .handler(|_, ctx| async move {
                let count = ctx
                    .workflow_state()
                    .and_then(|s| s.get("count").and_then(Value::as_i64))
                    .unwrap_or(0)
                    + 1;
                ctx.update_workflow_state(json!({ "count": count }));
                Ok(json!(count))
            })
            .build()?;
        ctx.register_tool(bump).await?;
        Ok(())
    }
}

fn call(name: &str, message: Option<&str>, session: Option<&str>) -> InboundRequest {
    let mut params = json!({ "name": name, "arguments": {}, "userId": "u-1" });
    if let Some(message) = message {
        params["message"] = json!(message);
    }
    if let Some(session) = session {
        params["sessionId"] = json!(session);
    }
    InboundRequest::from_envelope(
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(params),
        },
        RequestMetadata::for_transport(TransportKind::Stdio),
    )
}

async fn kernel() -> (ServerKernel, Arc<Orchestrator>) {
    let host = Arc::new(PluginHost::default());
    host.register(Arc::new(WorkflowToolsPlugin {
        metadata: PluginMetadata::new("wf", "Workflow tools", "0.0.0", "Workflow-aware tools"),
    }))
    .await
    .unwrap();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(InMemorySessionStore::new()),
        Duration::from_secs(30 * 60),
    ));
    orchestrator.register_workflow(
        WorkflowDefinition::new("character-creation", "Character creation", "Builds characters")
            .with_triggers(&["create character"])
            .with_capabilities(&["wf:current-workflow", "wf:bump"]),
    );

    let kernel = ServerKernel::new("harbor-test", "0.0.0", host, MiddlewarePipeline::new())
        .with_orchestrator(Arc::clone(&orchestrator));
    (kernel, orchestrator)
}

fn text_of(response: &harbor::protocol::JsonRpcResponse) -> String {
    response.result.as_ref().unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn tool_observes_the_post_switch_workflow() {
    let (kernel, _) = kernel().await;
    let response = kernel
        .dispatch(call(
            "wf:current-workflow",
            Some("please create character"),
            Some("s-1"),
        ))
        .await
        .unwrap();
    assert_eq!(text_of(&response), "character-creation");
}

#[tokio::test]
async fn message_flows_into_the_session_history() {
    let (kernel, orchestrator) = kernel().await;
    kernel
        .dispatch(call(
            "wf:current-workflow",
            Some("please create character"),
            Some("s-2"),
        ))
        .await
        .unwrap();

    let session = orchestrator
        .sessions()
        .get_session("s-2")
        .await
        .unwrap()
        .expect("session created by the kernel");
    assert_eq!(session.active_workflow.as_deref(), Some("character-creation"));
    assert_eq!(session.conversation_history.len(), 1);
    assert_eq!(
        session.conversation_history[0].content,
        "please create character"
    );
}

#[tokio::test]
async fn exit_message_clears_the_workflow_for_the_next_call() {
    let (kernel, _) = kernel().await;
    kernel
        .dispatch(call(
            "wf:current-workflow",
            Some("please create character"),
            Some("s-3"),
        ))
        .await
        .unwrap();

    let response = kernel
        .dispatch(call("wf:current-workflow", Some("ok I'm done"), Some("s-3")))
        .await
        .unwrap();
    assert_eq!(text_of(&response), "general");
}

#[tokio::test]
async fn workflow_scratch_state_persists_between_calls() {
    let (kernel, _) = kernel().await;
    let first = kernel
        .dispatch(call("wf:bump", Some("please create character"), Some("s-4")))
        .await
        .unwrap();
    assert_eq!(text_of(&first), "1");

    // Second call carries no switching message but stays in the workflow.
    let second = kernel
        .dispatch(call("wf:bump", Some("keep going"), Some("s-4")))
        .await
        .unwrap();
    assert_eq!(text_of(&second), "2");
}

#[tokio::test]
async fn calls_without_identity_run_without_request_context() {
    let (kernel, _) = kernel().await;
    let req = InboundRequest::from_envelope(
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "tools/call".to_string(),
            params: Some(json!({ "name": "wf:current-workflow", "arguments": {} })),
        },
        RequestMetadata::for_transport(TransportKind::Stdio),
    );
    let response = kernel.dispatch(req).await.unwrap();
    assert_eq!(text_of(&response), "general");
}
