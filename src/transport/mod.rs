//! Transport implementations: stdio, HTTP, and WebSocket.
//!
//! Every transport speaks the same uniform interface: wire a request handler,
//! `start`, `stop` (graceful: stop accepting, drain in-flight work, close),
//! and `send` for server-initiated broadcast where the medium supports it.
//! Incoming frames are normalized into [`InboundRequest`] before the handler
//! sees them; parse failures and handler errors are serialized into JSON-RPC
//! error envelopes rather than tearing down the connection.

pub mod http;
pub mod stdio;
pub mod websocket;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::TransportError;
use crate::protocol::{InboundRequest, JsonRpcResponse};
use crate::server::ServerKernel;

/// The callback transports feed normalized requests into. Returns `None`
/// for notifications (no response frame).
pub type RequestHandler =
    Arc<dyn Fn(InboundRequest) -> BoxFuture<'static, Option<JsonRpcResponse>> + Send + Sync>;

/// Narrows a broadcast to connections whose id satisfies the predicate.
pub type BroadcastFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Uniform transport interface.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Wires the request handler. Must be called before `start`.
    fn on_request(&self, handler: RequestHandler);

    /// Starts accepting requests. Returns once the transport is serving.
    async fn start(&self) -> Result<(), TransportError>;

    /// Graceful shutdown: stop accepting, drain in-flight requests, close.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Broadcasts a raw JSON object to connected clients, returning how
    /// many received it. Unsupported on stdio and HTTP.
    async fn send(
        &self,
        payload: Value,
        filter: Option<BroadcastFilter>,
    ) -> Result<usize, TransportError>;
}

/// Adapts the kernel's dispatcher into a transport request handler.
pub fn kernel_handler(kernel: Arc<ServerKernel>) -> RequestHandler {
    Arc::new(move |req| {
        let kernel = Arc::clone(&kernel);
        Box::pin(async move { kernel.dispatch(req).await })
    })
}
