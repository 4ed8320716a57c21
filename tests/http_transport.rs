use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use harbor::config::HttpOptions;
use harbor::middleware::MiddlewarePipeline;
use harbor::plugins::builder::ToolBuilder;
use harbor::plugins::builtin::EchoPlugin;
use harbor::plugins::host::{PluginHost, RegistrationContext};
use harbor::plugins::{Plugin, PluginMetadata};
use harbor::protocol::{INTERNAL_ERROR, PARSE_ERROR};
use harbor::server::ServerKernel;
use harbor::transport::http::build_router;
use harbor::transport::kernel_handler;

/// Exposes request-context fields so header harvesting is observable.
struct IntrospectPlugin {
    metadata: PluginMetadata,
}

#[async_trait::async_trait]
impl Plugin for IntrospectPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    async fn initialize(&self, ctx: &RegistrationContext) -> anyhow::Result<()> {
        let whoami = ToolBuilder::new("whoami")
            .description("Returns the caller's session id")
            .handler(|_, ctx| async move {
                let session = ctx
                    .request_context()
                    .map(|r| r.session_id.clone())
                    .unwrap_or_else(|| "none".to_string());
                Ok(Value::String(session))
            })
            .build()?;
        ctx.register_tool(whoami).await?;

        let fail = ToolBuilder::new("fail")
            .description("Fails on purpose")
            .handler(|_, _| async { anyhow::bail!("boom") })
            .build()?;
        ctx.register_tool(fail).await?;
        Ok(())
    }
}

async fn test_router() -> Router {
    let host = Arc::new(PluginHost::default());
    host.register(Arc::new(EchoPlugin::new())).await.unwrap();
    host.register(Arc::new(IntrospectPlugin {
        metadata: PluginMetadata::new("meta", "Introspection plugin", "0.0.0", "Test helper"),
    }))
    .await
    .unwrap();
    let kernel = Arc::new(ServerKernel::new(
        "harbor-test",
        "0.0.0",
        host,
        MiddlewarePipeline::new(),
    ));
    build_router(kernel_handler(kernel), &HttpOptions::default())
}

fn rpc_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_reports_transport() {
    let router = test_router().await;
    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["transport"], json!("http"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn echo_round_trips_over_http() {
    let router = test_router().await;
    let response = router
        .oneshot(rpc_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"demo:echo","arguments":{"text":"hi"}}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["content"][0]["text"], json!("hi"));
    assert_eq!(body["id"], json!(1));
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let router = test_router().await;
    let response = router.oneshot(rpc_request("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!(PARSE_ERROR));
}

#[tokio::test]
async fn handler_failure_maps_to_http_500() {
    let router = test_router().await;
    let response = router
        .oneshot(rpc_request(
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"meta:fail","arguments":{}}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!(INTERNAL_ERROR));
    assert!(body["error"]["message"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn session_header_reaches_the_request_context() {
    let router = test_router().await;
    let mut request = rpc_request(
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"meta:whoami","arguments":{}}}"#,
    );
    request
        .headers_mut()
        .insert("x-session-id", "s-42".parse().unwrap());
    request
        .headers_mut()
        .insert("x-user-id", "u-42".parse().unwrap());

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["content"][0]["text"], json!("s-42"));
}

#[tokio::test]
async fn notifications_are_accepted_without_body() {
    let router = test_router().await;
    let response = router
        .oneshot(rpc_request(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn tools_list_over_http_names_are_namespaced() {
    let router = test_router().await;
    let response = router
        .oneshot(rpc_request(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["demo:echo", "meta:fail", "meta:whoami"]);
}
