//! JSON-RPC over a single HTTP POST endpoint.
//!
//! `POST /mcp` takes one JSON-RPC envelope per request and answers with one;
//! `GET /health` reports liveness. Session identity travels in the
//! `x-session-id` / `x-user-id` / `x-workflow-id` headers and is merged into
//! the normalized request alongside user-agent and peer address. A client
//! that disconnects mid-request drops the in-flight handler future at its
//! next suspension point.

use std::net::SocketAddr;
use std::sync::{Mutex, RwLock};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::{BroadcastFilter, RequestHandler, Transport};
use crate::config::HttpOptions;
use crate::errors::TransportError;
use crate::protocol::{
    INTERNAL_ERROR, InboundRequest, JsonRpcRequest, JsonRpcResponse, RequestMetadata,
    RpcErrorObject, TransportKind,
};

#[derive(Clone)]
struct HttpState {
    handler: RequestHandler,
    trust_proxy: bool,
    max_body_size: usize,
}

/// The HTTP transport.
pub struct HttpTransport {
    options: HttpOptions,
    handler: RwLock<Option<RequestHandler>>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpTransport {
    pub fn new(options: HttpOptions) -> Self {
        Self {
            options,
            handler: RwLock::new(None),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }
}

/// Builds the transport router. Exposed so tests can drive it without
/// binding a socket.
pub fn build_router(handler: RequestHandler, options: &HttpOptions) -> Router {
    let state = HttpState {
        handler,
        trust_proxy: options.trust_proxy,
        max_body_size: options.max_body_size,
    };

    let mut router = Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(handle_health))
        .with_state(state);

    if let Some(cors) = options.cors.clone() {
        router = router.layer(cors.into_layer());
    }
    router.layer(TraceLayer::new_for_http())
}

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "transport": "http",
    }))
}

async fn handle_mcp(State(state): State<HttpState>, request: Request) -> Response {
    let peer_from_socket = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.to_string());

    let (parts, body) = request.into_parts();
    let headers = parts.headers;

    let bytes = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(JsonRpcResponse::error(
                    None,
                    RpcErrorObject::invalid_request("Request body too large"),
                )),
            )
                .into_response();
        }
    };

    let envelope: JsonRpcRequest = match serde_json::from_slice(&bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(
                    None,
                    RpcErrorObject::parse_error(format!("Parse error: {}", e)),
                )),
            )
                .into_response();
        }
    };

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    let peer_addr = if state.trust_proxy {
        header("x-forwarded-for")
            .and_then(|chain| chain.split(',').next().map(|s| s.trim().to_string()))
            .or(peer_from_socket)
    } else {
        peer_from_socket
    };

    let mut req = InboundRequest::from_envelope(
        envelope,
        RequestMetadata {
            transport: TransportKind::Http,
            connection_id: None,
            user_agent: header("user-agent"),
            peer_addr,
        },
    );
    // Headers take precedence over envelope params for session identity.
    if let Some(session) = header("x-session-id") {
        req.session_id = Some(session);
    }
    if let Some(user) = header("x-user-id") {
        req.user_id = Some(user);
    }
    if let Some(workflow) = header("x-workflow-id") {
        req.workflow_id = Some(workflow);
    }

    match (state.handler)(req).await {
        None => StatusCode::ACCEPTED.into_response(),
        Some(response) => {
            let status = match &response.error {
                Some(error) if error.code == INTERNAL_ERROR => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::OK,
            };
            (status, Json(response)).into_response()
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn on_request(&self, handler: RequestHandler) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = Some(handler);
        }
    }

    async fn start(&self) -> Result<(), TransportError> {
        let handler = self
            .handler
            .read()
            .ok()
            .and_then(|h| h.clone())
            .ok_or(TransportError::NoHandler)?;

        let addr = self.options.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;

        tracing::info!("Starting HTTP transport on http://{}", addr);
        let router = build_router(handler, &self.options);
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!("HTTP transport error: {}", e);
            }
        });
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.shutdown.cancel();
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        tracing::debug!("HTTP transport stopped");
        Ok(())
    }

    async fn send(
        &self,
        _payload: Value,
        _filter: Option<BroadcastFilter>,
    ) -> Result<usize, TransportError> {
        Err(TransportError::BroadcastUnsupported("http"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_chain_takes_first_hop() {
        let chain = "203.0.113.9, 10.0.0.1";
        let first = chain.split(',').next().map(|s| s.trim().to_string());
        assert_eq!(first.as_deref(), Some("203.0.113.9"));
    }
}
